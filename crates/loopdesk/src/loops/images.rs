//! Loop image manifest entries and upload checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::error::ValidationError;

/// One entry of a loop's ordered image manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Stored blob name.
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mimetype: String,
    pub upload_date: DateTime<Utc>,
}

/// An image received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub original_name: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

/// Checks count, type and size of a batch before anything is written.
pub fn check_uploads(uploads: &[ImageUpload], limits: &Limits) -> Result<(), ValidationError> {
    if uploads.len() > limits.max_images_per_upload {
        return Err(ValidationError::TooManyFiles {
            count: uploads.len(),
            limit: limits.max_images_per_upload,
        });
    }
    for upload in uploads {
        if !upload.mimetype.starts_with("image/") {
            return Err(ValidationError::UnsupportedFileType(format!(
                "{} ({}), only images are allowed",
                upload.original_name, upload.mimetype
            )));
        }
        let size = upload.bytes.len() as u64;
        if size > limits.max_image_bytes {
            return Err(ValidationError::FileTooLarge {
                name: upload.original_name.clone(),
                size,
                limit: limits.max_image_bytes,
            });
        }
    }
    Ok(())
}

/// File extension for a stored image, from the original name or mimetype.
pub fn image_extension(upload: &ImageUpload) -> String {
    std::path::Path::new(&upload.original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&upload.mimetype)
                .and_then(|exts| exts.first())
                .map(|e| e.to_string())
        })
        .unwrap_or_else(|| "img".to_string())
}

/// Serializes a manifest for storage. An empty manifest is stored as NULL.
pub fn encode_manifest(images: &[ImageRecord]) -> Result<Option<String>, serde_json::Error> {
    if images.is_empty() {
        Ok(None)
    } else {
        serde_json::to_string(images).map(Some)
    }
}

pub fn decode_manifest(raw: Option<&str>) -> Result<Vec<ImageRecord>, serde_json::Error> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json),
    }
}
