// ABOUTME: Session persistence between chunk requests with a sliding expiry
// ABOUTME: Sessions are stored serialized so a shared backend can replace the in-memory map

use super::session::ImportSession;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<ImportSession>>;

    /// Store `session`, restarting its expiry
    async fn save(&self, session: &ImportSession) -> Result<()>;

    /// Drop expired sessions, returning how many were removed
    async fn purge_expired(&self) -> usize;
}

pub struct MemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<ImportSession>> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        sessions.retain(|_, (_, expires)| *expires > now);

        match sessions.get(id) {
            Some((json, _)) => {
                let session = serde_json::from_str(json)
                    .with_context(|| format!("Corrupt stored session '{}'", id))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &ImportSession) -> Result<()> {
        let json = serde_json::to_string(session).context("Failed to serialize session")?;
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), (json, Instant::now() + self.ttl));
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let now = Instant::now();
        sessions.retain(|_, (_, expires)| *expires > now);
        before - sessions.len()
    }
}

/// Periodically purge expired sessions until the runtime shuts down
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!("Purged {} expired import session(s)", purged);
            }
        }
    })
}
