//! CLI module for Turnstile
//!
//! # Commands
//!
//! - `serve` - Start the proxy and control surface
//! - `config init` - Write an example configuration file
//!
//! # Example
//!
//! ```bash
//! turnstile config init
//! turnstile serve --port 9090 --log-level debug
//! ```

pub mod config;
pub mod serve;

pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Turnstile - admission-controlled proxy for Ollama and Qdrant
#[derive(Parser, Debug)]
#[command(
    name = "turnstile",
    version,
    about = "Queueing proxy that serializes calls to local inference and vector-search backends"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the Turnstile server
    Serve(ServeArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "turnstile.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "TURNSTILE_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "TURNSTILE_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TURNSTILE_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "turnstile.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}
