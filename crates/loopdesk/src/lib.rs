pub mod actor;
pub mod app;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod hooks;
pub mod loops;
pub mod notify;
pub mod sanitize;
pub mod secrets;
pub mod settings;
pub mod storage;
pub mod templates;

pub use actor::{Actor, RequestContext, Role};
pub use app::{mailer_from_config, Loopdesk, Stores};
pub use audit::{ActionType, ActivityEntry, ActivityLogger, ActivityQuery, ActivityStats};
pub use config::{load_config, load_config_from_str, AppConfig, Limits};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, ExportError, LoopdeskError, Result, StorageError, ValidationError,
};
pub use generator::{DocumentGenerator, GeneratedDocument, GeneratedFile, GenerationResult};
pub use hooks::{CommitEvent, CommitKind, HookRunner, PostCommitHook};
pub use loops::{
    DashboardStats, ImageRecord, ImageUpload, Loop, LoopPatch, LoopQuery, LoopQueryParams,
    LoopService, LoopStats, LoopStatus, NewLoop, StatusFilter,
};
pub use notify::{LogMailer, Mailer, OutgoingEmail, SmtpMailer};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use settings::{NotificationSettings, SettingsService};
pub use storage::{BlobStore, FileStorage};
pub use templates::{
    DocumentTemplate, FieldMapping, FieldMappingInput, FieldType, LoopField, TemplateCategory,
    TemplateFileType, TemplateInfo, TemplateService, TemplateUpload,
};
