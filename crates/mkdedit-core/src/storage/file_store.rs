use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by virtual file store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileStoreError {
    /// A required field was empty.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
    /// Requested file does not exist.
    #[error("file not found: {name}")]
    NotFound { name: String },
    /// Underlying engine failure (I/O, decryption, corruption, commit).
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Flat store of named byte blobs. Every operation is atomic on its own;
/// sequences of operations are not.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist content under a name, replacing any existing content.
    async fn put(&self, name: &str, content: &[u8]) -> Result<(), FileStoreError>;

    /// Retrieve the content stored under a name.
    async fn get(&self, name: &str) -> Result<Vec<u8>, FileStoreError>;

    /// All names in the engine's key order. Contents are not read.
    async fn list(&self) -> Result<Vec<String>, FileStoreError>;

    /// Point lookup for a single name.
    async fn exists(&self, name: &str) -> Result<bool, FileStoreError>;

    /// Move content from `old` to `new` in one transaction. Fails with
    /// `NotFound` (and changes nothing) when `old` is absent at commit time.
    async fn rename(&self, old: &str, new: &str) -> Result<(), FileStoreError>;

    /// Remove a name (idempotent). Returns whether an entry was removed.
    async fn delete(&self, name: &str) -> Result<bool, FileStoreError>;
}

/// Reject empty names; `field` names the offending input in the error.
pub fn validate_name(field: &str, name: &str) -> Result<(), FileStoreError> {
    if name.is_empty() {
        return Err(FileStoreError::InvalidInput {
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

/// Map-backed store for tests and smoke runs. Ordered like the disk engine
/// (lexicographic by name) so list results match.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFileStore {
    inner: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, FileStoreError> {
        self.inner.lock().map_err(|err| FileStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn put(&self, name: &str, content: &[u8]) -> Result<(), FileStoreError> {
        validate_name("name", name)?;
        self.lock()?.insert(name.to_string(), content.to_vec());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, FileStoreError> {
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound {
                name: name.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<String>, FileStoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn exists(&self, name: &str) -> Result<bool, FileStoreError> {
        Ok(self.lock()?.contains_key(name))
    }

    async fn rename(&self, old: &str, new: &str) -> Result<(), FileStoreError> {
        validate_name("old", old)?;
        validate_name("new", new)?;

        let mut map = self.lock()?;
        if old == new {
            return if map.contains_key(old) {
                Ok(())
            } else {
                Err(FileStoreError::NotFound {
                    name: old.to_string(),
                })
            };
        }

        let content = map.remove(old).ok_or_else(|| FileStoreError::NotFound {
            name: old.to_string(),
        })?;
        map.insert(new.to_string(), content);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, FileStoreError> {
        Ok(self.lock()?.remove(name).is_some())
    }
}
