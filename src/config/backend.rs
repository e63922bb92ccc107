//! Backend configuration

use serde::{Deserialize, Serialize};

/// Connection and admission settings for one upstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    /// Capacity of the backend's gate
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Longest wait for response headers, and for each chunk after that
    pub timeout_seconds: u64,
}

fn default_max_concurrent() -> usize {
    1
}

impl BackendConfig {
    pub fn ollama() -> Self {
        Self {
            url: "http://127.0.0.1:11434".to_string(),
            max_concurrent: default_max_concurrent(),
            timeout_seconds: 300,
        }
    }

    pub fn qdrant() -> Self {
        Self {
            url: "http://127.0.0.1:6333".to_string(),
            max_concurrent: default_max_concurrent(),
            timeout_seconds: 60,
        }
    }
}

/// The two proxied services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "BackendConfig::ollama", deserialize_with = "ollama_section")]
    pub ollama: BackendConfig,
    #[serde(default = "BackendConfig::qdrant", deserialize_with = "qdrant_section")]
    pub qdrant: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            ollama: BackendConfig::ollama(),
            qdrant: BackendConfig::qdrant(),
        }
    }
}

impl BackendsConfig {
    /// `(name, config)` pairs, used for validation messages and metric labels.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &BackendConfig)> {
        [("ollama", &self.ollama), ("qdrant", &self.qdrant)].into_iter()
    }
}

/// Section fields that may be left out of the TOML.
#[derive(Deserialize)]
struct PartialBackend {
    url: Option<String>,
    max_concurrent: Option<usize>,
    timeout_seconds: Option<u64>,
}

impl PartialBackend {
    fn over(self, mut base: BackendConfig) -> BackendConfig {
        if let Some(url) = self.url {
            base.url = url;
        }
        if let Some(n) = self.max_concurrent {
            base.max_concurrent = n;
        }
        if let Some(t) = self.timeout_seconds {
            base.timeout_seconds = t;
        }
        base
    }
}

fn ollama_section<'de, D>(deserializer: D) -> Result<BackendConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(PartialBackend::deserialize(deserializer)?.over(BackendConfig::ollama()))
}

fn qdrant_section<'de, D>(deserializer: D) -> Result<BackendConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(PartialBackend::deserialize(deserializer)?.over(BackendConfig::qdrant()))
}
