use crate::domain::{Message, NewMessage};
use crate::error::{ChatError, Result};
use crate::services::{SharedState, read_state, with_timeout, write_state};
use crate::session::Session;
use crate::storage::ChatStore;
use opentelemetry::{
    KeyValue, global,
    metrics::Counter,
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    echo_deduped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("partswap-chat");
        Self {
            sent_total: meter
                .u64_counter("partswap_messages_sent_total")
                .with_description("Send attempts by outcome")
                .build(),
            echo_deduped_total: meter
                .u64_counter("partswap_send_echo_deduped_total")
                .with_description("Local echoes skipped because the insert event arrived first")
                .build(),
        }
    }
}

/// The send pipeline: validate, authorize, confirm a session, insert
/// remotely, update thread metadata best-effort, then echo locally. The
/// local state is never touched before the insert succeeds, so a failed send
/// needs no rollback; the caller restores the draft and may retry.
#[derive(Debug, Clone)]
pub struct SendPipeline {
    store: Arc<dyn ChatStore>,
    state: SharedState,
    session: Session,
    timeout_secs: u64,
    metrics: Metrics,
}

impl SendPipeline {
    pub(crate) fn new(
        store: Arc<dyn ChatStore>,
        state: SharedState,
        session: Session,
        timeout_secs: u64,
    ) -> Self {
        Self { store, state, session, timeout_secs, metrics: Metrics::new() }
    }

    /// Sends a message, returning the persisted row so the UI can render it
    /// without waiting for a reload.
    ///
    /// # Errors
    /// `EmptyMessage` if the trimmed text is empty and no image is attached;
    /// `NoSession` / `ThreadNotFound` / `NotParticipant` before any network
    /// call; `PermissionDenied`, `Timeout`, or `Store` from the insert
    /// itself. Never retried automatically.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, text, image_url),
        fields(%thread_id, %sender_id)
    )]
    pub async fn send_message(
        &self,
        thread_id: Uuid,
        text: &str,
        sender_id: Uuid,
        image_url: Option<String>,
    ) -> Result<Message> {
        let trimmed = text.trim();
        if trimmed.is_empty() && image_url.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        // Session first: without one the thread cache is empty anyway, and a
        // signed-out caller should hear about the session, not the cache.
        if self.session.current_user().is_none() {
            return Err(ChatError::NoSession);
        }

        // Advisory participant check against the local cache; the store
        // re-enforces this at the row level.
        let thread =
            read_state(&self.state).thread(thread_id).cloned().ok_or(ChatError::ThreadNotFound)?;
        if !thread.is_participant(sender_id) {
            return Err(ChatError::NotParticipant);
        }

        let new = NewMessage {
            thread_id,
            sender_id,
            text: (!trimmed.is_empty()).then(|| trimmed.to_owned()),
            image_url,
        };
        let message = match with_timeout(self.timeout_secs, self.store.insert_message(new)).await {
            Ok(row) => row,
            Err(e) => {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "failure")]);
                return Err(e);
            }
        };

        // The message is durable; metadata updates are secondary and must
        // not fail the send.
        if let Err(e) = self.store.touch_thread(thread_id, message.created_at).await {
            tracing::warn!(error = %e, %thread_id, "last-message update failed after send");
        }
        if let Err(e) = self.store.increment_unread(thread_id).await {
            tracing::warn!(error = %e, %thread_id, "unread increment failed after send");
        }

        if !write_state(&self.state).append_local_echo(message.clone()) {
            self.metrics.echo_deduped_total.add(1, &[]);
        }
        self.metrics.sent_total.add(1, &[KeyValue::new("status", "success")]);
        tracing::debug!(message_id = %message.id, "message sent");

        Ok(message)
    }
}
