// ABOUTME: TOML configuration for the import server
// ABOUTME: Listen address, bearer tokens, session expiry, chunk limits and named target servers

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// A named PostgreSQL server that import requests can select
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Accepted bearer tokens; empty disables authentication
    pub auth_tokens: Vec<String>,
    pub session_ttl_secs: u64,
    pub max_chunk_bytes: usize,
    pub servers: BTreeMap<String, ServerEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8432".to_string(),
            auth_tokens: Vec::new(),
            session_ttl_secs: 3600,
            max_chunk_bytes: 16 * 1024 * 1024,
            servers: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Parse and validate configuration text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(text).context("Invalid server configuration")?;
        for (name, entry) in &config.servers {
            crate::utils::validate_connection_string(&entry.url)
                .with_context(|| format!("Invalid URL for server '{}'", name))?;
        }
        anyhow::ensure!(config.max_chunk_bytes > 0, "max_chunk_bytes must be positive");
        anyhow::ensure!(config.session_ttl_secs > 0, "session_ttl_secs must be positive");
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text)
    }
}
