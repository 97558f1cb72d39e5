use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StoreConfig;

/// Name of the secret file kept next to the engine files in disk mode.
pub const SECRET_FILE_NAME: &str = ".secret";

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Key material used for encryption at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Where the key came from (`file`, `ephemeral`, `override`); safe to log.
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LEN],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("random source failed: {0}")]
    Generation(String),
    #[error("failed to create secret directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read secret file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write secret file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{origin} holds {len} bytes, expected 32")]
    InvalidLength { origin: String, len: usize },
    #[error("decode error: {0}")]
    Decode(String),
}

/// Provides the store's encryption key (secret file on disk, fresh key for memory-only stores).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Secret persisted at `<root>/.secret`. Once written it is never replaced.
#[derive(Debug, Clone)]
pub struct SecretFileProvider {
    root: PathBuf,
}

impl SecretFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn secret_path(&self) -> PathBuf {
        self.root.join(SECRET_FILE_NAME)
    }
}

#[async_trait]
impl KeyProvider for SecretFileProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let path = self.secret_path();
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(path = %path.display(), "loaded existing secret");
                material_from_bytes("file", &path.display().to_string(), &bytes)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                persist_new_secret(&self.root, &path)
            }
            Err(source) => Err(KeyError::Read { path, source }),
        }
    }
}

/// Fresh key on every call, never written anywhere. For memory-only stores.
#[derive(Debug, Default, Clone)]
pub struct EphemeralKeyProvider;

#[async_trait]
impl KeyProvider for EphemeralKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        generate_key("ephemeral")
    }
}

/// Explicitly configured key that bypasses the secret file.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    material: KeyMaterial,
}

impl StaticKeyProvider {
    pub fn new(material: KeyMaterial) -> Self {
        Self { material }
    }

    /// Accepts standard base64 that decodes to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::Decode(e.to_string()))?;
        let material = material_from_bytes("override", "configured encryption key", &bytes)?;
        Ok(Self { material })
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        Ok(self.material.clone())
    }
}

/// Resolve the key for a store rooted at `root`: fresh for memory-only
/// stores, otherwise loaded from (or created at) the secret file.
pub async fn resolve_key(root: &Path, in_memory: bool) -> Result<KeyMaterial, KeyError> {
    if in_memory {
        return EphemeralKeyProvider.get_or_create().await;
    }
    SecretFileProvider::new(root).get_or_create().await
}

/// Resolve the key for a store config, honouring an explicit override first.
pub async fn key_for_config(config: &StoreConfig) -> Result<KeyMaterial, KeyError> {
    if let Some(encoded) = &config.encryption_key {
        return StaticKeyProvider::from_base64(encoded)?
            .get_or_create()
            .await;
    }
    resolve_key(&config.root_path, config.in_memory).await
}

/// Encode key bytes the way `StaticKeyProvider::from_base64` expects them.
pub fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn generate_key(id: &str) -> Result<KeyMaterial, KeyError> {
    let mut bytes = [0u8; KEY_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok(KeyMaterial {
        id: id.to_string(),
        bytes,
    })
}

fn material_from_bytes(id: &str, origin: &str, bytes: &[u8]) -> Result<KeyMaterial, KeyError> {
    let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
        origin: origin.to_string(),
        len: bytes.len(),
    })?;
    Ok(KeyMaterial {
        id: id.to_string(),
        bytes,
    })
}

fn persist_new_secret(root: &Path, path: &Path) -> Result<KeyMaterial, KeyError> {
    let material = generate_key("file")?;

    fs::create_dir_all(root).map_err(|source| KeyError::CreateDir {
        path: root.to_path_buf(),
        source,
    })?;

    let write_err = |source: io::Error| KeyError::Write {
        path: path.to_path_buf(),
        source,
    };
    // NamedTempFile is created with owner-only permissions on Unix.
    let mut tmp = NamedTempFile::new_in(root).map_err(write_err)?;
    tmp.write_all(&material.bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    match tmp.persist_noclobber(path) {
        Ok(_) => {
            info!(path = %path.display(), "generated new store secret");
            Ok(material)
        }
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            // Lost a race with another process; its secret wins.
            let bytes = fs::read(path).map_err(|source| KeyError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            material_from_bytes("file", &path.display().to_string(), &bytes)
        }
        Err(err) => Err(write_err(err.error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn secret_file_is_created_once_and_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = SecretFileProvider::new(dir.path());

        let first = provider.get_or_create().await.expect("create");
        let on_disk = fs::read(provider.secret_path()).expect("read secret");
        assert_eq!(on_disk, first.bytes);

        let second = provider.get_or_create().await.expect("reload");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_root_directories_are_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("nested").join("storage");

        let key = resolve_key(&root, false).await.expect("resolve");
        assert_eq!(fs::read(root.join(SECRET_FILE_NAME)).expect("read"), key.bytes);
    }

    #[tokio::test]
    async fn in_memory_keys_are_fresh_and_never_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");

        let first = resolve_key(dir.path(), true).await.expect("first");
        let second = resolve_key(dir.path(), true).await.expect("second");

        assert_ne!(first.bytes, second.bytes);
        assert_eq!(first.id, "ephemeral");
        assert!(!dir.path().join(SECRET_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn wrong_length_secret_is_rejected_and_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SECRET_FILE_NAME);
        fs::write(&path, [7u8; 16]).expect("write short secret");

        let err = resolve_key(dir.path(), false)
            .await
            .expect_err("short secret must fail");
        assert!(matches!(err, KeyError::InvalidLength { len: 16, .. }));
        assert_eq!(fs::read(&path).expect("read"), [7u8; 16]);
    }

    #[tokio::test]
    async fn override_bypasses_secret_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let material = KeyMaterial {
            id: "override".into(),
            bytes: [3u8; KEY_LEN],
        };
        let config = StoreConfig {
            root_path: dir.path().to_path_buf(),
            encryption_key: Some(encode_key(&material)),
            ..StoreConfig::default()
        };

        let key = key_for_config(&config).await.expect("override");
        assert_eq!(key, material);
        assert!(!dir.path().join(SECRET_FILE_NAME).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn secret_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        resolve_key(dir.path(), false).await.expect("resolve");

        let mode = fs::metadata(dir.path().join(SECRET_FILE_NAME))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn concurrently_created_secret_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SECRET_FILE_NAME);
        fs::write(&path, [5u8; KEY_LEN]).expect("write existing secret");

        let material = persist_new_secret(dir.path(), &path).expect("persist");
        assert_eq!(material.bytes, [5u8; KEY_LEN]);
        assert_eq!(fs::read(&path).expect("read"), [5u8; KEY_LEN]);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = StaticKeyProvider::from_base64("abcd").expect_err("should reject wrong length");
        assert!(matches!(err, KeyError::InvalidLength { len: 3, .. }));

        let err = StaticKeyProvider::from_base64("not base64!").expect_err("bad encoding");
        assert!(matches!(err, KeyError::Decode(_)));
    }

    #[test]
    fn debug_output_redacts_key_bytes() {
        let material = KeyMaterial {
            id: "file".into(),
            bytes: [0xAB; KEY_LEN],
        };
        let rendered = format!("{material:?}");
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("171"));
    }
}
