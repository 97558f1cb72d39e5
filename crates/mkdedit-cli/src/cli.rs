use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

/// CLI surface definition. Store/server flags override the config file.
#[derive(Parser, Debug)]
#[command(
    name = "mkdedit",
    about = "Encrypted virtual file store served over HTTP",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Optional subcommand; defaults to serving when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Store root directory (engine file and secret).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
    /// Keep the store in memory; contents and key vanish on exit.
    #[arg(long, global = true)]
    pub in_memory: bool,
    /// Engine cache size in MiB.
    #[arg(long, global = true)]
    pub cache_size_mib: Option<u64>,
    /// Address to listen on.
    #[arg(long, global = true)]
    pub listen: Option<SocketAddr>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the /vfs endpoint until interrupted.
    Serve,
    /// Print version and exit.
    Version,
    /// Run a put/get/delete probe against the configured store.
    Health,
    /// Manage configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
