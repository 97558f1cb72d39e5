use std::{fs, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use mkdedit_core::storage::{validate_name, FileStore, FileStoreError};
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};
use thiserror::Error;
use tracing::{info, instrument};

use crate::{cipher::ValueCipher, config::StoreConfig, key_provider::KeyMaterial};

/// Engine file inside the store root.
pub const DATABASE_FILE_NAME: &str = "files.redb";

/// File contents: key = file name, value = sealed content.
const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Store metadata: key = identifier, value = sealed payload.
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const KEY_CHECK: &str = "key_check";
const KEY_CHECK_PLAINTEXT: &[u8] = b"mkdedit key check v1";

/// Startup failures. None of these are recoverable for the process.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open database: {reason}")]
    Database { reason: String },
    #[error("encryption key does not match the existing store data")]
    KeyMismatch,
}

/// Virtual file store on a redb database. Cloning shares the one open handle.
#[derive(Clone)]
pub struct KvFileStore {
    inner: Arc<KvHandle>,
}

struct KvHandle {
    db: Database,
    cipher: ValueCipher,
}

impl KvFileStore {
    /// Open (or initialise) the store described by `config` with `key`.
    /// Fails with `KeyMismatch` when the data was written under a different key.
    pub fn open(config: &StoreConfig, key: &KeyMaterial) -> Result<Self, OpenError> {
        let mut builder = Database::builder();
        builder.set_cache_size(config.cache_size_bytes());

        let db = if config.in_memory {
            builder.create_with_backend(InMemoryBackend::new())
        } else {
            fs::create_dir_all(&config.root_path).map_err(|source| OpenError::CreateDir {
                path: config.root_path.clone(),
                source,
            })?;
            builder.create(config.database_path())
        }
        .map_err(open_err)?;

        let handle = KvHandle {
            db,
            cipher: ValueCipher::new(key),
        };
        handle.initialize()?;

        info!(
            in_memory = config.in_memory,
            root = %config.root_path.display(),
            key_source = %key.id,
            "file store opened"
        );
        Ok(Self {
            inner: Arc::new(handle),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, FileStoreError>
    where
        F: FnOnce(&KvHandle) -> Result<T, FileStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let handle = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(handle.as_ref()))
            .await
            .map_err(storage_err)?
    }
}

impl KvHandle {
    fn initialize(&self) -> Result<(), OpenError> {
        let txn = self.db.begin_write().map_err(open_err)?;
        {
            txn.open_table(FILES_TABLE).map_err(open_err)?;
            let mut meta = txn.open_table(META_TABLE).map_err(open_err)?;
            let existing = meta
                .get(KEY_CHECK)
                .map_err(open_err)?
                .map(|guard| guard.value().to_vec());

            match existing {
                Some(sealed) => {
                    let plain = self
                        .cipher
                        .open(KEY_CHECK, &sealed)
                        .map_err(|_| OpenError::KeyMismatch)?;
                    if plain != KEY_CHECK_PLAINTEXT {
                        return Err(OpenError::KeyMismatch);
                    }
                }
                None => {
                    let sealed = self
                        .cipher
                        .seal(KEY_CHECK, KEY_CHECK_PLAINTEXT)
                        .map_err(open_err)?;
                    meta.insert(KEY_CHECK, sealed.as_slice())
                        .map_err(open_err)?;
                }
            }
        }
        txn.commit().map_err(open_err)
    }

    fn put(&self, name: &str, content: &[u8]) -> Result<(), FileStoreError> {
        let sealed = self.cipher.seal(name, content)?;
        let txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
            table
                .insert(name, sealed.as_slice())
                .map_err(storage_err)?;
        }
        txn.commit().map_err(storage_err)
    }

    fn get(&self, name: &str) -> Result<Vec<u8>, FileStoreError> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
        let sealed = table
            .get(name)
            .map_err(storage_err)?
            .map(|guard| guard.value().to_vec())
            .ok_or_else(|| not_found(name))?;
        self.cipher.open(name, &sealed)
    }

    fn list(&self) -> Result<Vec<String>, FileStoreError> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
        let mut names = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (key, _) = entry.map_err(storage_err)?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    fn exists(&self, name: &str) -> Result<bool, FileStoreError> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
        Ok(table.get(name).map_err(storage_err)?.is_some())
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), FileStoreError> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
            let sealed = table
                .get(old)
                .map_err(storage_err)?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| not_found(old))?;

            if old != new {
                // Values are bound to their name, so the copy is re-sealed.
                let content = self.cipher.open(old, &sealed)?;
                let resealed = self.cipher.seal(new, &content)?;
                table
                    .insert(new, resealed.as_slice())
                    .map_err(storage_err)?;
                table.remove(old).map_err(storage_err)?;
            }
        }
        txn.commit().map_err(storage_err)
    }

    fn delete(&self, name: &str) -> Result<bool, FileStoreError> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        let removed = {
            let mut table = txn.open_table(FILES_TABLE).map_err(storage_err)?;
            let removed = table.remove(name).map_err(storage_err)?.is_some();
            removed
        };
        txn.commit().map_err(storage_err)?;
        Ok(removed)
    }
}

#[async_trait]
impl FileStore for KvFileStore {
    #[instrument(skip_all, fields(name = %name))]
    async fn put(&self, name: &str, content: &[u8]) -> Result<(), FileStoreError> {
        validate_name("name", name)?;
        let name = name.to_string();
        let content = content.to_vec();
        self.run(move |handle| handle.put(&name, &content)).await
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn get(&self, name: &str) -> Result<Vec<u8>, FileStoreError> {
        let name = name.to_string();
        self.run(move |handle| handle.get(&name)).await
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<String>, FileStoreError> {
        self.run(|handle| handle.list()).await
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn exists(&self, name: &str) -> Result<bool, FileStoreError> {
        let name = name.to_string();
        self.run(move |handle| handle.exists(&name)).await
    }

    #[instrument(skip_all, fields(%old, %new))]
    async fn rename(&self, old: &str, new: &str) -> Result<(), FileStoreError> {
        validate_name("old", old)?;
        validate_name("new", new)?;
        let (old, new) = (old.to_string(), new.to_string());
        self.run(move |handle| handle.rename(&old, &new)).await
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn delete(&self, name: &str) -> Result<bool, FileStoreError> {
        let name = name.to_string();
        self.run(move |handle| handle.delete(&name)).await
    }
}

fn not_found(name: &str) -> FileStoreError {
    FileStoreError::NotFound {
        name: name.to_string(),
    }
}

fn storage_err<E: ToString>(err: E) -> FileStoreError {
    FileStoreError::Storage {
        reason: err.to_string(),
    }
}

fn open_err<E: ToString>(err: E) -> OpenError {
    OpenError::Database {
        reason: err.to_string(),
    }
}
