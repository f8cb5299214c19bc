//! Helpers for sanitizing data before it enters log lines, span attributes
//! or generated file names.

use std::path::Path;

/// The file name of `path` without its directories, for log lines and
/// span fields.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Replaces every character outside `[A-Za-z0-9]` with an underscore.
///
/// Used to turn a template display name into a file name token, so
/// `"Purchase Agreement (v2)"` becomes `"Purchase_Agreement__v2_"`.
pub fn filename_token(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Masks the local part of an email address for log output.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        _ => "<redacted>".to_string(),
    }
}
