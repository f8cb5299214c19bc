//! Blob storage for uploaded templates, loop images and generated documents.
//!
//! A handle is a bare file name inside one store's directory. Handles never
//! contain path separators, so a store cannot be tricked into touching
//! files outside its directory.

pub mod filesystem;

use chrono::{DateTime, Utc};

use crate::error::StorageError;

pub use filesystem::FileStorage;

/// Metadata for one stored blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    /// Creation time, or modification time where the platform has none.
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

pub trait BlobStore: Send + Sync {
    /// Stores bytes under a fresh unique name with the given extension.
    fn put(&self, bytes: &[u8], extension: &str) -> Result<String, StorageError>;

    /// Stores bytes under `name`. If that name is taken a numbered variant
    /// (`name_2.ext`) is used. Returns the name actually written.
    fn put_named(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError>;

    fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, handle: &str) -> bool;

    /// Removes a blob. `Ok(false)` when it was already gone.
    fn delete(&self, handle: &str) -> Result<bool, StorageError>;

    /// Every blob in the store, in no particular order.
    fn list(&self) -> Result<Vec<StoredFile>, StorageError>;
}

/// Rejects empty names and anything that could escape the store directory.
pub fn validate_handle(handle: &str) -> Result<(), StorageError> {
    if handle.is_empty()
        || handle.contains('/')
        || handle.contains('\\')
        || handle.contains("..")
        || handle.contains('\0')
    {
        return Err(StorageError::InvalidName(handle.to_string()));
    }
    Ok(())
}
