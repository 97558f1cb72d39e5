use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::kv_file_store::DATABASE_FILE_NAME;

pub const DEFAULT_ROOT_PATH: &str = "./storage";
pub const DEFAULT_CACHE_SIZE_MIB: u64 = 100;

/// Store settings, read from the `[store]` table of the config file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the engine file and the secret.
    pub root_path: PathBuf,
    /// Engine page cache, in MiB.
    pub cache_size_mib: u64,
    /// Keep everything in memory; nothing touches disk.
    pub in_memory: bool,
    /// Base64 32-byte key; skips the secret file entirely when set.
    pub encryption_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from(DEFAULT_ROOT_PATH),
            cache_size_mib: DEFAULT_CACHE_SIZE_MIB,
            in_memory: false,
            encryption_key: None,
        }
    }
}

impl StoreConfig {
    /// Memory-only store with default settings.
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    /// Disk-backed store rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root.into(),
            ..Self::default()
        }
    }

    pub fn cache_size_bytes(&self) -> usize {
        let mib = if self.cache_size_mib == 0 {
            DEFAULT_CACHE_SIZE_MIB
        } else {
            self.cache_size_mib
        };
        usize::try_from(mib.saturating_mul(1 << 20)).unwrap_or(usize::MAX)
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_path.join(DATABASE_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let cfg: StoreConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.cache_size_bytes(), 100 << 20);
    }

    #[test]
    fn zero_cache_size_falls_back_to_default() {
        let cfg = StoreConfig {
            cache_size_mib: 0,
            ..StoreConfig::default()
        };
        assert_eq!(cfg.cache_size_bytes(), 100 << 20);
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let cfg: StoreConfig = toml::from_str(
            r#"
            root_path = "/var/lib/mkdedit"
            in_memory = true
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.root_path, PathBuf::from("/var/lib/mkdedit"));
        assert!(cfg.in_memory);
        assert_eq!(cfg.cache_size_mib, DEFAULT_CACHE_SIZE_MIB);
        assert_eq!(cfg.encryption_key, None);
        assert_eq!(
            cfg.database_path(),
            PathBuf::from("/var/lib/mkdedit").join(DATABASE_FILE_NAME)
        );
    }
}
