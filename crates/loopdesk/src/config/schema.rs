use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

const MIB: u64 = 1024 * 1024;

/// Application configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,
    /// Defaults to `<data_directory>/loopdesk.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub uploads: UploadDirs,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default = "default_closing_soon_days")]
    pub closing_soon_days: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            database_path: None,
            uploads: UploadDirs::default(),
            limits: Limits::default(),
            closing_soon_days: default_closing_soon_days(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            smtp: None,
        }
    }
}

impl AppConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_directory.join("loopdesk.db"))
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_directory.join(&self.uploads.templates)
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.data_directory.join(&self.uploads.generated)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_directory.join(&self.uploads.images)
    }

    /// Applies environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary lookup (the process environment
    /// in production, a map in tests).
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("LOOPDESK_DATA_DIR") {
            self.data_directory = PathBuf::from(dir);
        }
        if let Some(path) = get("LOOPDESK_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(port) = get("PORT") {
            self.server.port = parse_port("PORT", &port)?;
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.auth.jwt_secret = Some(SecretString::from(secret));
        }

        if let Some(host) = get("SMTP_HOST") {
            let smtp = self.smtp.get_or_insert_with(|| SmtpConfig {
                host: String::new(),
                port: default_smtp_port(),
                from: String::new(),
                username: None,
                password: None,
                password_file: None,
            });
            smtp.host = host;
        }
        if let Some(smtp) = self.smtp.as_mut() {
            if let Some(port) = get("SMTP_PORT") {
                smtp.port = parse_port("SMTP_PORT", &port)?;
            }
            if let Some(user) = get("SMTP_USER") {
                smtp.username = Some(user);
            }
            if let Some(pass) = get("SMTP_PASS") {
                smtp.password = Some(SecretString::from(pass));
            }
            if let Some(from) = get("SMTP_FROM") {
                smtp.from = from;
            } else if smtp.from.is_empty() {
                if let Some(user) = smtp.username.clone() {
                    smtp.from = user;
                }
            }
        }
        Ok(())
    }
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        reason: format!("'{}' is not a port number", value),
    })
}

/// Upload sub-directories, relative to the data directory unless absolute.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadDirs {
    #[serde(default = "default_templates_dir")]
    pub templates: PathBuf,
    #[serde(default = "default_generated_dir")]
    pub generated: PathBuf,
    #[serde(default = "default_images_dir")]
    pub images: PathBuf,
}

impl Default for UploadDirs {
    fn default() -> Self {
        Self {
            templates: default_templates_dir(),
            generated: default_generated_dir(),
            images: default_images_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_template_bytes")]
    pub max_template_bytes: u64,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
    #[serde(default = "default_max_images_per_upload")]
    pub max_images_per_upload: usize,
    #[serde(default = "default_pdf_export_max_images")]
    pub pdf_export_max_images: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_template_bytes: default_max_template_bytes(),
            max_image_bytes: default_max_image_bytes(),
            max_images_per_upload: default_max_images_per_upload(),
            pdf_export_max_images: default_pdf_export_max_images(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            log_format: LogFormat::default(),
        }
    }
}

/// Bearer-token verification settings.
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default, deserialize_with = "optional_secret")]
    pub jwt_secret: Option<SecretString>,
    /// Read the signing key from a file (Docker secrets style).
    #[serde(default)]
    pub jwt_secret_file: Option<String>,
}

impl AuthConfig {
    /// Resolves the signing key, inline value first, then the file.
    pub fn resolve_jwt_secret(&self) -> Result<SecretString, ConfigError> {
        use secrecy::ExposeSecret;

        let direct = self.jwt_secret.as_ref().map(|s| s.expose_secret());
        let secret = crate::secrets::resolve_secret(direct, self.jwt_secret_file.as_deref())?;
        if secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "auth.jwt_secret must not be empty".to_string(),
            });
        }
        Ok(secret)
    }
}

#[derive(Debug, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "optional_secret")]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub password_file: Option<String>,
}

impl SmtpConfig {
    pub fn resolve_password(&self) -> Result<Option<SecretString>, ConfigError> {
        use secrecy::ExposeSecret;

        let direct = self.password.as_ref().map(|s| s.expose_secret());
        Ok(crate::secrets::resolve_secret_optional(
            direct,
            self.password_file.as_deref(),
        )?)
    }
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(SecretString::from))
}

fn default_data_directory() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".loopdesk"))
        .unwrap_or_else(|| PathBuf::from(".loopdesk"))
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("uploads/templates")
}

fn default_generated_dir() -> PathBuf {
    PathBuf::from("uploads/generated")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("uploads/images")
}

fn default_closing_soon_days() -> u32 {
    3
}

fn default_max_template_bytes() -> u64 {
    10 * MIB
}

fn default_max_image_bytes() -> u64 {
    5 * MIB
}

fn default_max_images_per_upload() -> usize {
    5
}

fn default_pdf_export_max_images() -> usize {
    6
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_smtp_port() -> u16 {
    587
}
