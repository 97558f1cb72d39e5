mod cli;
mod config;
mod storage;

use std::sync::Arc;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use mkdedit_core::storage::FileStore;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Reserved name used by the health probe; removed again before returning.
const HEALTH_PROBE_NAME: &str = ".mkdedit-health-probe";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;
    config.apply_overrides(
        &cli.overrides,
        std::env::var(config::ENCRYPTION_KEY_ENV).ok(),
    );

    match cli.command.unwrap_or(cli::Command::Serve) {
        cli::Command::Serve => run_serve(&config).await?,
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(cli.config.as_deref(), &config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("mkdedit {}", env!("CARGO_PKG_VERSION"));
}

/// Open the store once and serve it until Ctrl-C.
async fn run_serve(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(&config.store).await?;
    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;

    mkdedit_server::serve(listener, Arc::new(store), shutdown_signal())
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;

    info!("store closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c, shutting down: {err}");
    }
}

/// Runs a quick health check of the encrypted store.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(&config.store).await?;
    run_store_health(&store).await?;
    println!("Storage: ok");
    Ok(())
}

async fn run_store_health<S: FileStore>(store: &S) -> Result<()> {
    let payload = b"ok";
    store
        .put(HEALTH_PROBE_NAME, payload)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let round_trip = store
        .get(HEALTH_PROBE_NAME)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    store
        .delete(HEALTH_PROBE_NAME)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(explicit: Option<&std::path::Path>, config: &config::Config) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config::default_path()?,
    };
    // Key overrides stay out of the written file.
    let mut template = config.clone();
    template.store.encryption_key = None;
    let path = config::write_default_if_missing(&template, &path)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use mkdedit_core::storage::InMemoryFileStore;
    use mkdedit_storage::config::StoreConfig;

    use super::*;

    #[tokio::test]
    async fn health_check_with_memory_store_succeeds() {
        let store = InMemoryFileStore::new();
        run_store_health(&store)
            .await
            .expect("health check should succeed");
        assert!(!store.exists(HEALTH_PROBE_NAME).await.expect("exists"));
    }

    #[tokio::test]
    async fn health_check_with_disk_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = storage::store_from_config(&StoreConfig::at(dir.path()))
            .await
            .expect("open");
        run_store_health(&store)
            .await
            .expect("health check should succeed");
        assert!(store.list().await.expect("list").is_empty());
    }
}
