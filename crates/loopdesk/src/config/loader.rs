use std::path::Path;

use crate::config::schema::AppConfig;
use crate::error::ConfigError;

/// Maximum look-ahead for the closing-soon alert.
const MAX_CLOSING_SOON_DAYS: u32 = 365;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Semantic checks serde cannot express. Run again after env overrides.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port must not be 0"));
    }

    let limits = &config.limits;
    if limits.max_template_bytes == 0 {
        return Err(invalid("limits.max_template_bytes must be greater than 0"));
    }
    if limits.max_image_bytes == 0 {
        return Err(invalid("limits.max_image_bytes must be greater than 0"));
    }
    if limits.max_images_per_upload == 0 {
        return Err(invalid("limits.max_images_per_upload must be greater than 0"));
    }
    if limits.pdf_export_max_images == 0 {
        return Err(invalid("limits.pdf_export_max_images must be greater than 0"));
    }

    if config.closing_soon_days > MAX_CLOSING_SOON_DAYS {
        return Err(invalid(&format!(
            "closing_soon_days must be at most {}",
            MAX_CLOSING_SOON_DAYS
        )));
    }

    let uploads = &config.uploads;
    if uploads.templates == uploads.generated
        || uploads.templates == uploads.images
        || uploads.generated == uploads.images
    {
        return Err(invalid(
            "uploads.templates, uploads.generated and uploads.images must be distinct",
        ));
    }

    if let Some(smtp) = &config.smtp {
        if smtp.host.trim().is_empty() {
            return Err(invalid("smtp.host must not be empty"));
        }
        if smtp.from.trim().is_empty() {
            return Err(invalid("smtp.from must not be empty"));
        }
        if smtp.port == 0 {
            return Err(invalid("smtp.port must not be 0"));
        }
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}
