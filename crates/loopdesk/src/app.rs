//! Wires the database, blob stores and post-commit hooks into the services.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::actor::Actor;
use crate::audit::{ActivityLogger, AuditHook};
use crate::config::{AppConfig, Limits};
use crate::db::{format_timestamp, loop_repo, user_repo, Database};
use crate::error::{ConfigError, Result};
use crate::generator::DocumentGenerator;
use crate::hooks::HookRunner;
use crate::loops::LoopService;
use crate::notify::{LogMailer, LoopNotifier, Mailer, NotificationHook, SmtpMailer};
use crate::sanitize::redact_path;
use crate::settings::SettingsService;
use crate::storage::{BlobStore, FileStorage};
use crate::templates::TemplateService;

/// The three blob stores the services write to.
#[derive(Clone)]
pub struct Stores {
    pub templates: Arc<dyn BlobStore>,
    pub generated: Arc<dyn BlobStore>,
    pub images: Arc<dyn BlobStore>,
}

impl Stores {
    /// Filesystem stores under the configured upload directories, created
    /// if missing.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            templates: Arc::new(FileStorage::create(config.templates_dir())?),
            generated: Arc::new(FileStorage::create(config.generated_dir())?),
            images: Arc::new(FileStorage::create(config.images_dir())?),
        })
    }

    /// Stores in `templates/`, `generated/` and `images/` below `root`.
    pub fn under(root: &Path) -> Result<Self> {
        Ok(Self {
            templates: Arc::new(FileStorage::create(root.join("templates"))?),
            generated: Arc::new(FileStorage::create(root.join("generated"))?),
            images: Arc::new(FileStorage::create(root.join("images"))?),
        })
    }
}

/// SMTP delivery when configured, otherwise a mailer that only logs.
pub fn mailer_from_config(config: &AppConfig) -> Result<Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::from_config(smtp).map_err(|e| ConfigError::Validation {
                message: format!("smtp: {}", e),
            })?;
            Ok(Arc::new(mailer))
        }
        None => {
            log::info!("SMTP not configured, notification emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Every service over one shared database and set of stores.
#[derive(Clone)]
pub struct Loopdesk {
    db: Database,
    loops: LoopService,
    templates: TemplateService,
    generator: DocumentGenerator,
    activity: ActivityLogger,
    settings: SettingsService,
}

impl Loopdesk {
    /// Opens the configured database and upload directories.
    pub fn from_config(config: &AppConfig, mailer: Arc<dyn Mailer>) -> Result<Self> {
        let db_path = config.database_path();
        log::info!("Opening database {}", redact_path(&db_path));
        let db = Database::open(&db_path)?;
        let stores = Stores::from_config(config)?;
        Self::new(db, stores, config.limits.clone(), config.closing_soon_days, mailer)
    }

    pub fn new(
        db: Database,
        stores: Stores,
        limits: Limits,
        closing_soon_days: u32,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self> {
        let normalized = loop_repo::normalize_legacy_statuses(&db)?;
        if normalized > 0 {
            log::info!("Normalized {} loop(s) with legacy statuses", normalized);
        }

        let activity = ActivityLogger::new(db.clone());
        let hooks = HookRunner::default()
            .with_hook(Arc::new(AuditHook::new(Arc::new(activity.clone()))))
            .with_hook(Arc::new(NotificationHook::new(LoopNotifier::new(
                db.clone(),
                mailer,
            ))));

        Ok(Self {
            loops: LoopService::new(
                db.clone(),
                stores.images.clone(),
                limits.clone(),
                closing_soon_days,
                hooks.clone(),
            ),
            templates: TemplateService::new(
                db.clone(),
                stores.templates.clone(),
                limits,
                hooks.clone(),
            ),
            generator: DocumentGenerator::new(
                db.clone(),
                stores.templates,
                stores.generated,
                hooks.clone(),
            ),
            settings: SettingsService::new(db.clone(), hooks),
            activity,
            db,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Records an authenticated identity in the user directory so loop
    /// reads can name their creator and notifications can reach admins.
    pub fn identify(&self, actor: &Actor, email: Option<&str>) -> Result<()> {
        let now = format_timestamp(Utc::now());
        user_repo::upsert(&self.db, actor.id, &actor.name, actor.role.as_str(), email, &now)?;
        Ok(())
    }

    pub fn loops(&self) -> &LoopService {
        &self.loops
    }

    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    pub fn generator(&self) -> &DocumentGenerator {
        &self.generator
    }

    pub fn activity(&self) -> &ActivityLogger {
        &self.activity
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }
}
