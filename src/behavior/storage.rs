//! Durable client storage for behaviour profiles.
//!
//! Storage holds opaque strings by namespace. Absence is not an error
//! (`Ok(None)`); decoding is the tracker's job.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;

#[async_trait]
pub trait DurableStorage: Send + Sync {
    async fn read(&self, namespace: &str) -> Result<Option<String>, StorageError>;
    async fn write(&self, namespace: &str, value: &str) -> Result<(), StorageError>;
}

/// In-process storage. Survives nothing; used for tests and first-run tools.
#[derive(Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn read(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().await.get(namespace).cloned())
    }

    async fn write(&self, namespace: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .await
            .insert(namespace.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per namespace under a base directory.
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    /// Create the storage, making sure the directory exists.
    pub async fn new(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base = base.into();
        fs::create_dir_all(&base).await?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// File path for a namespace. Characters outside `[A-Za-z0-9_-]` are
    /// percent-escaped so distinct namespaces never share a file.
    fn path_for(&self, namespace: &str) -> Result<PathBuf, StorageError> {
        if namespace.is_empty() {
            return Err(StorageError::InvalidNamespace(namespace.to_string()));
        }
        let mut name = String::with_capacity(namespace.len() + 5);
        for byte in namespace.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".json");
        Ok(self.base.join(name))
    }
}

#[async_trait]
impl DurableStorage for FileStorage {
    async fn read(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(namespace)?;
        match fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, namespace: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(namespace)?;
        // Write-then-rename so a crash never leaves a torn file behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;

        debug!(namespace, path = %path.display(), size = value.len(), "Wrote namespace");
        Ok(())
    }
}
