use crate::config::PresenceConfig;
use crate::services::{SharedState, read_state};
use crate::storage::ChatStore;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Own-user heartbeat writer plus the cached online map. Remote presence
/// events land in the shared state through the reconciler; this service only
/// produces this client's heartbeats and answers `is_online`.
#[derive(Debug)]
pub struct PresenceTracker {
    store: Arc<dyn ChatStore>,
    state: SharedState,
    config: PresenceConfig,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceTracker {
    pub(crate) const fn new(
        store: Arc<dyn ChatStore>,
        state: SharedState,
        config: PresenceConfig,
    ) -> Self {
        Self { store, state, config, heartbeat: Mutex::new(None) }
    }

    /// Marks the user online and starts the periodic heartbeat refresh. A
    /// failed write is logged, not surfaced: presence must never block a
    /// session from starting.
    pub async fn start(&self, user_id: Uuid) {
        if let Err(e) = self.store.write_presence(user_id, true, OffsetDateTime::now_utc()).await {
            tracing::warn!(error = %e, "online heartbeat write failed");
        }

        let store = Arc::clone(&self.store);
        let interval = Duration::from_secs(self.config.heartbeat_interval_secs);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; already written above
            loop {
                ticker.tick().await;
                if let Err(e) =
                    store.write_presence(user_id, true, OffsetDateTime::now_utc()).await
                {
                    tracing::warn!(error = %e, "heartbeat refresh failed");
                }
            }
        });

        if let Some(previous) = self.swap_heartbeat(Some(handle)) {
            previous.abort();
        }
    }

    /// Stops the heartbeat and writes the offline record. Best-effort: if
    /// the write fails the record simply goes stale until expired elsewhere.
    pub async fn stop(&self, user_id: Uuid) {
        if let Some(handle) = self.swap_heartbeat(None) {
            handle.abort();
        }
        if let Err(e) = self.store.write_presence(user_id, false, OffsetDateTime::now_utc()).await
        {
            tracing::warn!(error = %e, "offline heartbeat write failed");
        }
    }

    /// Cached-map read only; a user we have never heard about is offline.
    #[must_use]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        read_state(&self.state).is_online(user_id)
    }

    fn swap_heartbeat(&self, next: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        std::mem::replace(
            &mut *self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        )
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.swap_heartbeat(None) {
            handle.abort();
        }
    }
}
