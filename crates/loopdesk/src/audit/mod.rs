//! Activity log: an append-only record of who did what.
//!
//! Recording is best-effort. An insert failure is logged and swallowed so a
//! committed mutation never fails because its audit row could not be
//! written.

pub mod hook;

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::{Actor, RequestContext};
use crate::db::activity_repo::{self, ActivityCounts, ActivityFilter, ActivityRow, NewActivityRow};
use crate::db::{format_timestamp, parse_timestamp, Database};
use crate::error::{Result, ValidationError};

pub use hook::AuditHook;

/// Default page size when a query gives no limit.
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Login,
    Logout,
    LoopCreated,
    LoopUpdated,
    LoopDeleted,
    LoopArchived,
    LoopUnarchived,
    PasswordChanged,
    SettingsUpdated,
    ExportData,
    UserSuspended,
    UserUnsuspended,
    UserImported,
    TemplateUploaded,
    TemplateUpdated,
    TemplateDeleted,
    TemplateFieldsMapped,
    DocumentGenerated,
    DocumentDeleted,
}

impl ActionType {
    pub const ALL: [ActionType; 19] = [
        ActionType::Login,
        ActionType::Logout,
        ActionType::LoopCreated,
        ActionType::LoopUpdated,
        ActionType::LoopDeleted,
        ActionType::LoopArchived,
        ActionType::LoopUnarchived,
        ActionType::PasswordChanged,
        ActionType::SettingsUpdated,
        ActionType::ExportData,
        ActionType::UserSuspended,
        ActionType::UserUnsuspended,
        ActionType::UserImported,
        ActionType::TemplateUploaded,
        ActionType::TemplateUpdated,
        ActionType::TemplateDeleted,
        ActionType::TemplateFieldsMapped,
        ActionType::DocumentGenerated,
        ActionType::DocumentDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Login => "LOGIN",
            ActionType::Logout => "LOGOUT",
            ActionType::LoopCreated => "LOOP_CREATED",
            ActionType::LoopUpdated => "LOOP_UPDATED",
            ActionType::LoopDeleted => "LOOP_DELETED",
            ActionType::LoopArchived => "LOOP_ARCHIVED",
            ActionType::LoopUnarchived => "LOOP_UNARCHIVED",
            ActionType::PasswordChanged => "PASSWORD_CHANGED",
            ActionType::SettingsUpdated => "SETTINGS_UPDATED",
            ActionType::ExportData => "EXPORT_DATA",
            ActionType::UserSuspended => "USER_SUSPENDED",
            ActionType::UserUnsuspended => "USER_UNSUSPENDED",
            ActionType::UserImported => "USER_IMPORTED",
            ActionType::TemplateUploaded => "TEMPLATE_UPLOADED",
            ActionType::TemplateUpdated => "TEMPLATE_UPDATED",
            ActionType::TemplateDeleted => "TEMPLATE_DELETED",
            ActionType::TemplateFieldsMapped => "TEMPLATE_FIELDS_MAPPED",
            ActionType::DocumentGenerated => "DOCUMENT_GENERATED",
            ActionType::DocumentDeleted => "DOCUMENT_DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|a| a.as_str() == upper)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row as returned to administrators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_role: Option<String>,
    pub action_type: String,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub additional_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityEntry {
    fn from(row: ActivityRow) -> Self {
        let additional_data = row.additional_data.as_deref().and_then(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| log::warn!("Unreadable additional_data on activity {}: {}", row.id, e))
                .ok()
        });
        Self {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            user_email: row.user_email,
            user_role: row.user_role,
            action_type: row.action_type,
            description: row.description,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            additional_data,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

/// An audit record waiting to be written.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: i64,
    pub action: ActionType,
    pub description: String,
    pub context: RequestContext,
    pub additional_data: Option<serde_json::Value>,
}

impl NewActivity {
    pub fn new(actor: &Actor, action: ActionType, description: impl Into<String>) -> Self {
        Self {
            user_id: actor.id,
            action,
            description: description.into(),
            context: RequestContext::default(),
            additional_data: None,
        }
    }

    pub fn with_context(mut self, context: &RequestContext) -> Self {
        self.context = context.clone();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.additional_data = Some(data);
        self
    }
}

/// Filter accepted from callers. Dates are inclusive `YYYY-MM-DD` bounds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityQuery {
    pub user_id: Option<i64>,
    pub action_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u32>,
}

impl ActivityQuery {
    fn to_filter(&self) -> std::result::Result<ActivityFilter, ValidationError> {
        let date = |field: &'static str, raw: &Option<String>| {
            match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|d| Some(d.format("%Y-%m-%d").to_string()))
                    .map_err(|_| ValidationError::invalid(field, "expected YYYY-MM-DD")),
                None => Ok(None),
            }
        };

        let action_type = match self.action_type.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Some(
                ActionType::parse(s)
                    .ok_or_else(|| ValidationError::invalid("action_type", s.to_string()))?
                    .as_str()
                    .to_string(),
            ),
            _ => None,
        };

        Ok(ActivityFilter {
            user_id: self.user_id,
            action_type,
            from_date: date("start_date", &self.start_date)?,
            to_date: date("end_date", &self.end_date)?,
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            limit: Some(self.limit.unwrap_or(DEFAULT_QUERY_LIMIT).max(1)),
        })
    }
}

pub type ActivityStats = ActivityCounts;

/// Where audit records go.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: NewActivity);
}

#[derive(Clone)]
pub struct ActivityLogger {
    db: Database,
}

impl ActivityLogger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn query(&self, actor: &Actor, query: &ActivityQuery) -> Result<Vec<ActivityEntry>> {
        actor.require_admin("view activity logs")?;
        let filter = query.to_filter()?;
        let rows = activity_repo::query(&self.db, &filter)?;
        Ok(rows.into_iter().map(ActivityEntry::from).collect())
    }

    pub fn stats(&self, actor: &Actor) -> Result<ActivityStats> {
        actor.require_admin("view activity statistics")?;
        self.stats_at(Utc::now())
    }

    fn stats_at(&self, now: DateTime<Utc>) -> Result<ActivityStats> {
        let today = now.date_naive();
        let week_start = today - Duration::days(7);
        Ok(activity_repo::counts(
            &self.db,
            &today.format("%Y-%m-%d").to_string(),
            &week_start.format("%Y-%m-%d").to_string(),
        )?)
    }

    /// Deletes every entry. Returns the number cleared.
    pub fn clear_all(&self, actor: &Actor) -> Result<usize> {
        actor.require_admin("clear activity logs")?;
        let cleared = activity_repo::clear_all(&self.db)?;
        log::info!("Cleared {} activity log entries (by user {})", cleared, actor.id);
        Ok(cleared)
    }
}

impl AuditSink for ActivityLogger {
    fn record(&self, entry: NewActivity) {
        let additional_data = entry.additional_data.as_ref().map(|v| v.to_string());
        let created_at = format_timestamp(Utc::now());
        let row = NewActivityRow {
            user_id: entry.user_id,
            action_type: entry.action.as_str(),
            description: &entry.description,
            ip_address: entry.context.ip_address.as_deref(),
            user_agent: entry.context.user_agent.as_deref(),
            additional_data: additional_data.as_deref(),
            created_at: &created_at,
        };

        match activity_repo::insert(&self.db, &row) {
            Ok(_) => log::debug!(
                "Activity logged: {} - {} (user {})",
                entry.action,
                entry.description,
                entry.user_id
            ),
            Err(e) => log::error!("Failed to log activity {}: {}", entry.action, e),
        }
    }
}
