use color_eyre::Result;
use mkdedit_storage::{
    config::StoreConfig,
    key_provider::key_for_config,
    kv_file_store::KvFileStore,
};
use tracing::debug;

/// Resolve the encryption key and open the store described by `config`.
/// Any failure here is fatal: the process must not serve with a wrong or unpersisted key.
pub async fn store_from_config(config: &StoreConfig) -> Result<KvFileStore> {
    debug!(
        root = %config.root_path.display(),
        in_memory = config.in_memory,
        key_override = config.encryption_key.is_some(),
        "initializing encrypted store"
    );
    let key = key_for_config(config).await?;
    let store = KvFileStore::open(config, &key)?;
    Ok(store)
}
