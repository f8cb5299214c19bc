//! Credentials the server needs at runtime: the JWT signing key and the
//! SMTP password.
//!
//! Either is given inline in the config file or as a path to a file that
//! holds it (`/run/secrets/jwt_secret` style mounts). Environment
//! overrides are applied to the inline value before resolution, see
//! [`AppConfig::apply_env`](crate::config::AppConfig::apply_env).

use std::path::PathBuf;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret configured (set an inline value or a secret file)")]
    NoSourceProvided,

    #[error("Failed to read secret file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Returns the inline value if non-empty, otherwise the trimmed contents of
/// `file_path`. Blank entries count as absent.
pub fn resolve_secret(inline: Option<&str>, file_path: Option<&str>) -> Result<SecretString> {
    if let Some(value) = inline.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    let Some(path) = file_path.map(str::trim).filter(|p| !p.is_empty()) else {
        return Err(SecretError::NoSourceProvided);
    };
    let path = expand_home(path);
    std::fs::read_to_string(&path)
        .map(|content| SecretString::from(content.trim().to_string()))
        .map_err(|source| SecretError::FileReadError {
            path: crate::sanitize::redact_path(&path),
            source,
        })
}

/// Like [`resolve_secret`], but nothing configured is `Ok(None)`.
pub fn resolve_secret_optional(
    inline: Option<&str>,
    file_path: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(inline, file_path) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// `~/x` becomes `$HOME/x`. `~user` forms are left alone.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => dirs::home_dir()
            .map(|home| home.join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}
