use std::{
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use mkdedit_storage::config::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Overrides;

/// Environment variable consulted for the key override when the file has none.
pub const ENCRYPTION_KEY_ENV: &str = "MKDEDIT_ENCRYPTION_KEY";

/// User-level configuration loaded from `~/.config/mkdedit/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Store location, cache size, memory mode and key override.
    pub store: StoreConfig,
    /// HTTP listener settings.
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
        }
    }
}

impl Config {
    /// Fold CLI flags and the key environment variable into the loaded file values.
    pub fn apply_overrides(&mut self, overrides: &Overrides, env_key: Option<String>) {
        if let Some(root) = &overrides.root {
            self.store.root_path = root.clone();
        }
        if overrides.in_memory {
            self.store.in_memory = true;
        }
        if let Some(mib) = overrides.cache_size_mib {
            self.store.cache_size_mib = mib;
        }
        if let Some(listen) = overrides.listen {
            self.server.listen = listen;
        }
        if self.store.encryption_key.is_none() {
            self.store.encryption_key = env_key.filter(|key| !key.trim().is_empty());
        }
    }
}

/// Load config from the given path, or the default path when none is given.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_from_path(path),
        None => load_from_path(default_path()?),
    }
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("mkdedit").join("config.toml"))
}

/// Write the given config to `path`, creating parent directories as needed.
/// Leaves an existing file untouched to avoid clobbering user edits.
pub fn write_default_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
