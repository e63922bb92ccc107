//! Configuration module for Turnstile
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`TURNSTILE_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use turnstile::config::TurnstileConfig;
//!
//! let config = TurnstileConfig::default();
//! assert_eq!(config.server.port, 8080);
//!
//! let toml = r#"
//! [backends.ollama]
//! max_concurrent = 2
//! "#;
//! let config: TurnstileConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.backends.ollama.max_concurrent, 2);
//! assert_eq!(config.backends.qdrant.max_concurrent, 1);
//! ```

pub mod backend;
pub mod error;
pub mod logging;
pub mod server;
pub mod tracker;

pub use backend::{BackendConfig, BackendsConfig};
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;
pub use tracker::TrackerConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the Turnstile server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TurnstileConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Lifecycle tracker sizing
    pub tracker: TrackerConfig,
    /// Upstream Ollama and Qdrant settings
    pub backends: BackendsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl TurnstileConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports TURNSTILE_* environment variables for common settings.
    /// Invalid values are silently ignored (current values are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("TURNSTILE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("TURNSTILE_HOST") {
            self.server.host = host;
        }

        if let Ok(level) = std::env::var("TURNSTILE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TURNSTILE_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(url) = std::env::var("TURNSTILE_OLLAMA_URL") {
            self.backends.ollama.url = url;
        }
        if let Ok(url) = std::env::var("TURNSTILE_QDRANT_URL") {
            self.backends.qdrant.url = url;
        }
        if let Ok(n) = std::env::var("TURNSTILE_OLLAMA_MAX_CONCURRENT") {
            if let Ok(n) = n.parse() {
                self.backends.ollama.max_concurrent = n;
            }
        }
        if let Ok(n) = std::env::var("TURNSTILE_QDRANT_MAX_CONCURRENT") {
            if let Ok(n) = n.parse() {
                self.backends.qdrant.max_concurrent = n;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }

        for (name, backend) in self.backends.iter() {
            if backend.url.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("backends.{}.url", name),
                    message: "URL cannot be empty".to_string(),
                });
            }
            if backend.max_concurrent == 0 {
                return Err(ConfigError::Validation {
                    field: format!("backends.{}.max_concurrent", name),
                    message: "at least one concurrent request is required".to_string(),
                });
            }
        }

        if self.tracker.history_capacity == 0 {
            return Err(ConfigError::Validation {
                field: "tracker.history_capacity".to_string(),
                message: "history must hold at least one entry".to_string(),
            });
        }
        if self.tracker.subscriber_buffer == 0 {
            return Err(ConfigError::Validation {
                field: "tracker.subscriber_buffer".to_string(),
                message: "subscriber buffer must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}
