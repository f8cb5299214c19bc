use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{validate_handle, BlobStore, StoredFile};
use crate::error::StorageError;
use crate::sanitize::redact_path;

/// A [`BlobStore`] backed by one directory on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Creates the store and its directory.
    pub fn create<P: AsRef<Path>>(directory: P) -> Result<Self, StorageError> {
        let storage = Self::new(directory);
        storage.ensure_directory()?;
        Ok(storage)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_of(&self, handle: &str) -> Result<PathBuf, StorageError> {
        validate_handle(handle)?;
        Ok(self.directory.join(handle))
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    /// Claims the first free name among `name`, `name_2`, `name_3`, ...
    /// Each claim is an exclusive create, so concurrent writers never share
    /// a file.
    fn write_unique(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        for candidate in numbered_variants(name).take(MAX_NAME_ATTEMPTS) {
            let path = self.directory.join(&candidate);
            match write_exclusive(&path, bytes) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => return Err(StorageError::WriteFile { path, source }),
            }
        }
        Err(StorageError::FileExists(self.directory.join(name)))
    }
}

const MAX_NAME_ATTEMPTS: usize = 1000;

/// `report.pdf`, `report_2.pdf`, `report_3.pdf`, ...
fn numbered_variants(name: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    std::iter::once(name.to_string()).chain((2..).map(move |n| format!("{stem}_{n}{ext}")))
}

/// Creates `path` (failing if it exists) and writes `bytes`. A partial
/// file is removed again.
fn write_exclusive(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(bytes) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

impl BlobStore for FileStorage {
    fn put(&self, bytes: &[u8], extension: &str) -> Result<String, StorageError> {
        let name = if extension.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", uuid::Uuid::new_v4(), extension)
        };
        self.put_named(&name, bytes)
    }

    fn put_named(&self, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        validate_handle(name)?;
        self.ensure_directory()?;
        let stored = self.write_unique(name, bytes)?;
        log::debug!("Stored blob {} ({} bytes)", stored, bytes.len());
        Ok(stored)
    }

    fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(handle)?;
        std::fs::read(&path).map_err(|e| StorageError::ReadFile { path, source: e })
    }

    fn exists(&self, handle: &str) -> bool {
        self.path_of(handle).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete(&self, handle: &str) -> Result<bool, StorageError> {
        let path = self.path_of(handle)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Blob {} already removed", redact_path(&path));
                Ok(false)
            }
            Err(e) => Err(StorageError::DeleteFile { path, source: e }),
        }
    }

    fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            StorageError::ListDirectory {
                path: self.directory.clone(),
                source: e,
            }
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::ListDirectory {
                path: self.directory.clone(),
                source: e,
            })?;
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!(
                        "Skipping unreadable entry {}: {}",
                        redact_path(&entry.path()),
                        e
                    );
                    continue;
                }
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            let created_at = metadata
                .created()
                .map(DateTime::<Utc>::from)
                .unwrap_or(modified_at);
            files.push(StoredFile {
                name,
                size: metadata.len(),
                created_at,
                modified_at,
            });
        }
        Ok(files)
    }
}
