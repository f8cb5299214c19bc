//! Transaction loops: the record type, its status lifecycle and the
//! service that mutates it.

pub mod export;
pub mod images;
pub mod query;
pub mod service;
pub mod validation;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub use images::{ImageRecord, ImageUpload};
pub use query::{LoopQuery, LoopQueryParams, SortField, SortOrder, StatusFilter};
pub use service::LoopService;

/// Lifecycle status of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoopStatus {
    PreOffer,
    UnderContract,
    Withdrawn,
    Sold,
    Terminated,
}

impl LoopStatus {
    pub const ALL: [LoopStatus; 5] = [
        LoopStatus::PreOffer,
        LoopStatus::UnderContract,
        LoopStatus::Withdrawn,
        LoopStatus::Sold,
        LoopStatus::Terminated,
    ];

    /// Statuses that still count as "open" for closing-soon alerts.
    pub const OPEN: [LoopStatus; 2] = [LoopStatus::PreOffer, LoopStatus::UnderContract];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::PreOffer => "pre-offer",
            LoopStatus::UnderContract => "under-contract",
            LoopStatus::Withdrawn => "withdrawn",
            LoopStatus::Sold => "sold",
            LoopStatus::Terminated => "terminated",
        }
    }

    /// Parses a canonical status or one of the legacy aliases
    /// (`active`, `closing`, `closed`, `cancelled`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre-offer" | "active" => Some(LoopStatus::PreOffer),
            "under-contract" | "closing" => Some(LoopStatus::UnderContract),
            "withdrawn" => Some(LoopStatus::Withdrawn),
            "sold" | "closed" => Some(LoopStatus::Sold),
            "terminated" | "cancelled" => Some(LoopStatus::Terminated),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    /// Parses a stored status column, falling back to `PreOffer` on garbage.
    pub(crate) fn from_column(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            log::warn!("Unknown loop status '{}', defaulting to pre-offer", s);
            LoopStatus::PreOffer
        })
    }
}

impl Default for LoopStatus {
    fn default() -> Self {
        LoopStatus::PreOffer
    }
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown loop status '{}'", s))
    }
}

impl TryFrom<String> for LoopStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoopStatus> for String {
    fn from(status: LoopStatus) -> Self {
        status.as_str().to_string()
    }
}

/// A real-estate transaction record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loop {
    pub id: i64,
    #[serde(rename = "type")]
    pub loop_type: String,
    pub sale: Option<f64>,
    pub status: LoopStatus,
    pub property_address: String,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub images: Vec<ImageRecord>,
    pub archived: bool,
    pub creator_id: Option<i64>,
    pub creator_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loop {
    /// The user-editable part of the record.
    pub fn fields(&self) -> LoopFields {
        LoopFields {
            loop_type: self.loop_type.clone(),
            sale: self.sale,
            status: self.status,
            property_address: self.property_address.clone(),
            client_name: self.client_name.clone(),
            client_email: self.client_email.clone(),
            client_phone: self.client_phone.clone(),
            notes: self.notes.clone(),
            tags: self.tags.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    /// Tags split on commas, trimmed, empties dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Validated, typed editable fields of a loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoopFields {
    pub loop_type: String,
    pub sale: Option<f64>,
    pub status: LoopStatus,
    pub property_address: String,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Raw loop creation payload as submitted by a client.
///
/// Every field is a string so validation can report precise errors;
/// `sale` also accepts a JSON number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLoop {
    #[serde(rename = "type")]
    pub loop_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub sale: Option<String>,
    pub status: Option<String>,
    pub property_address: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Partial update. `None` keeps the stored value; an empty string clears
/// an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoopPatch {
    #[serde(rename = "type")]
    pub loop_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub sale: Option<String>,
    pub status: Option<String>,
    pub property_address: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Aggregates over non-archived loops.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopStats {
    pub total: u64,
    pub active: u64,
    pub closing: u64,
    pub closed: u64,
    pub total_sales: f64,
}

/// `LoopStats` plus the closing-soon count shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub stats: LoopStats,
    pub closing_soon: u64,
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
