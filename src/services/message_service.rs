use crate::domain::Message;
use crate::services::{SharedState, read_state, with_timeout, write_state};
use crate::storage::ChatStore;
use std::sync::Arc;
use uuid::Uuid;

/// Read side of the per-thread message log. Writes never happen here: every
/// append goes through the send pipeline so the thread-metadata side effects
/// stay coupled to it.
#[derive(Debug, Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    state: SharedState,
    timeout_secs: u64,
}

impl MessageService {
    pub(crate) const fn new(store: Arc<dyn ChatStore>, state: SharedState, timeout_secs: u64) -> Self {
        Self { store, state, timeout_secs }
    }

    /// Messages in creation order, ascending. The first call per thread
    /// fetches from the store and merges with any rows the event stream
    /// delivered in the meantime; later calls serve the cache. A fetch
    /// failure degrades to whatever is cached, possibly nothing.
    #[tracing::instrument(skip(self))]
    pub async fn list_messages(&self, thread_id: Uuid) -> Vec<Message> {
        if read_state(&self.state).history_loaded(thread_id) {
            return read_state(&self.state).messages_for(thread_id).to_vec();
        }

        match with_timeout(self.timeout_secs, self.store.fetch_messages(thread_id)).await {
            Ok(fetched) => write_state(&self.state).install_history(thread_id, fetched),
            Err(e) => {
                tracing::warn!(error = %e, %thread_id, "message history fetch failed, serving cache");
            }
        }
        read_state(&self.state).messages_for(thread_id).to_vec()
    }
}
