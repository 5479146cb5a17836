// ABOUTME: Runs the HTTP import endpoint from a TOML configuration file

use crate::config::ServerConfig;
use crate::server;
use anyhow::Result;
use std::path::Path;

/// Load `config_path` (or defaults when absent) and serve until stopped
///
/// # Errors
///
/// Fails when the configuration is invalid or the listen address cannot be bound.
pub async fn serve(config_path: Option<&Path>, listen: Option<String>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(addr) = listen {
        config.listen_addr = addr;
    }
    tracing::info!(
        "{} target server(s) configured, sessions expire after {}s",
        config.servers.len(),
        config.session_ttl_secs
    );
    server::serve(config).await
}
