//! Server configuration

use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Timeout for untracked calls forwarded straight to a backend
    pub passthrough_timeout_seconds: u64,
    /// Mount the `/api/test/*` simulation routes
    pub enable_test_endpoints: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            passthrough_timeout_seconds: 30,
            enable_test_endpoints: false,
        }
    }
}
