//! Per-user notification preferences.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::actor::{Actor, RequestContext};
use crate::db::{format_timestamp, user_repo, Database};
use crate::error::{LoopdeskError, Result};
use crate::hooks::{CommitEvent, CommitKind, HookRunner};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub notify_on_new_loops: bool,
    pub notify_on_updated_loops: bool,
}

#[derive(Clone)]
pub struct SettingsService {
    db: Database,
    hooks: HookRunner,
}

impl SettingsService {
    pub fn new(db: Database, hooks: HookRunner) -> Self {
        Self { db, hooks }
    }

    /// The actor's preferences. Users the directory has not seen yet get
    /// everything switched off.
    pub fn get(&self, actor: &Actor) -> Result<NotificationSettings> {
        Ok(user_repo::find_by_id(&self.db, actor.id)?
            .map(|user| NotificationSettings {
                notify_on_new_loops: user.notify_on_new_loops,
                notify_on_updated_loops: user.notify_on_updated_loops,
            })
            .unwrap_or_default())
    }

    /// Only admins receive loop emails, so only admins may subscribe.
    pub fn update_notifications(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        settings: NotificationSettings,
    ) -> Result<NotificationSettings> {
        actor.require_admin("configure email notifications")?;

        let now = format_timestamp(Utc::now());
        user_repo::remember(&self.db, actor, &now)?;
        let changed = user_repo::set_notification_preferences(
            &self.db,
            actor.id,
            settings.notify_on_new_loops,
            settings.notify_on_updated_loops,
            &now,
        )?;
        if changed == 0 {
            return Err(LoopdeskError::not_found("User", actor.id));
        }
        log::info!(
            "User #{} notification preferences: new loops {}, updated loops {}",
            actor.id,
            settings.notify_on_new_loops,
            settings.notify_on_updated_loops
        );

        self.hooks.run(CommitEvent::new(
            actor,
            ctx,
            CommitKind::SettingsUpdated {
                notify_on_new_loops: settings.notify_on_new_loops,
                notify_on_updated_loops: settings.notify_on_updated_loops,
            },
        ));
        Ok(settings)
    }
}
