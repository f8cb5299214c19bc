//! Route handlers, one module per resource.

pub mod activity;
pub mod health;
pub mod loops;
pub mod settings;
pub mod templates;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, AppResult};

/// Runs synchronous library work (database, filesystem, rendering) off the
/// async worker threads.
pub(crate) async fn blocking<F, T>(f: F) -> AppResult<T>
where
    F: FnOnce() -> loopdesk::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
        .map_err(AppError::from)
}

/// How a browser should treat a file body.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

/// A raw file body with content type and disposition headers.
pub(crate) fn file_response(
    content_type: &str,
    disposition: Disposition,
    file_name: &str,
    bytes: Vec<u8>,
) -> Response {
    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    let safe_name: String = file_name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    (
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_DISPOSITION, format!("{kind}; filename=\"{safe_name}\"")),
        ],
        bytes,
    )
        .into_response()
}
