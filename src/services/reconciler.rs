use crate::config::SyncConfig;
use crate::services::thread_service::refresh_threads;
use crate::services::{SharedState, read_state, write_state};
use crate::state::IngestOutcome;
use crate::storage::{ChangeEvent, ChangeFeed, ChatStore};
use opentelemetry::{
    KeyValue, global,
    metrics::Counter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
struct Metrics {
    events_total: Counter<u64>,
    duplicates_discarded_total: Counter<u64>,
    reloads_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("partswap-chat");
        Self {
            events_total: meter
                .u64_counter("partswap_change_events_total")
                .with_description("Change events received, by kind")
                .build(),
            duplicates_discarded_total: meter
                .u64_counter("partswap_duplicate_events_discarded_total")
                .with_description("Insert events dropped by the seen-id guard")
                .build(),
            reloads_total: meter
                .u64_counter("partswap_thread_reloads_total")
                .with_description("Debounced full thread-list reloads")
                .build(),
        }
    }
}

/// Background task that folds the store's change feed into the shared state.
///
/// It is the meeting point of the three producers that can materialize a
/// message: the send pipeline's response, remote insert events, and full
/// reloads. The per-thread seen-id set inside `ChatState` keeps those three
/// from ever materializing the same row twice, whatever order they land in.
///
/// The subscription is scoped to the signed-in user and torn down and
/// re-established whenever the identity changes; local state is cleared at
/// the same point so one session can never read another's conversations.
#[derive(Debug)]
pub(crate) struct Reconciler {
    handle: JoinHandle<()>,
}

impl Reconciler {
    pub(crate) fn spawn(
        store: Arc<dyn ChatStore>,
        state: SharedState,
        session: &crate::session::Session,
        config: SyncConfig,
    ) -> Self {
        let identity = session.watch();
        let handle = tokio::spawn(run(store, state, identity, config));
        Self { handle }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

enum Exit {
    /// The signed-in identity changed; drop the feed and start over.
    IdentityChanged,
    /// The feed closed under us; re-subscribe for the same identity.
    Resubscribe,
    /// The session handle is gone entirely.
    Shutdown,
}

async fn run(
    store: Arc<dyn ChatStore>,
    state: SharedState,
    mut identity: watch::Receiver<Option<Uuid>>,
    config: SyncConfig,
) {
    let metrics = Metrics::new();
    loop {
        let current = *identity.borrow_and_update();
        // Whatever happened, the previous subscription's view is stale now.
        write_state(&state).clear();

        let Some(user) = current else {
            if identity.changed().await.is_err() {
                return;
            }
            continue;
        };

        let mut feed = match store.subscribe(user).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(error = %e, "change feed subscription failed, retrying");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                continue;
            }
        };
        tracing::debug!(%user, "change feed established");

        // Load the thread list only after the feed is live, so nothing can
        // slip between the snapshot and the first event.
        if let Err(e) = refresh_threads(&store, &state, user, config.store_timeout_secs).await {
            tracing::warn!(error = %e, "initial thread load failed");
        }

        match drain(&mut feed, user, &store, &state, &mut identity, &config, &metrics).await {
            Exit::IdentityChanged => {}
            Exit::Resubscribe => tokio::time::sleep(RESUBSCRIBE_DELAY).await,
            Exit::Shutdown => return,
        }
    }
}

/// Consumes one subscription until the identity changes or the feed dies.
async fn drain(
    feed: &mut ChangeFeed,
    user: Uuid,
    store: &Arc<dyn ChatStore>,
    state: &SharedState,
    identity: &mut watch::Receiver<Option<Uuid>>,
    config: &SyncConfig,
    metrics: &Metrics,
) -> Exit {
    let debounce = Duration::from_millis(config.reload_debounce_ms);
    let mut reload_at: Option<Instant> = None;

    loop {
        let due = reload_at;
        tokio::select! {
            changed = identity.changed() => {
                return if changed.is_ok() { Exit::IdentityChanged } else { Exit::Shutdown };
            }
            () = async {
                match due {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                reload_at = None;
                metrics.reloads_total.add(1, &[]);
                if let Err(e) = refresh_threads(store, state, user, config.store_timeout_secs).await {
                    tracing::warn!(error = %e, "debounced thread reload failed");
                }
            }
            event = feed.recv() => match event {
                Ok(event) => {
                    handle_event(event, user, state, &mut reload_at, debounce, metrics);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "change feed lagged, scheduling resync reload");
                    arm_reload(&mut reload_at, debounce);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::warn!("change feed closed");
                    return Exit::Resubscribe;
                }
            }
        }
    }
}

fn handle_event(
    event: ChangeEvent,
    user: Uuid,
    state: &SharedState,
    reload_at: &mut Option<Instant>,
    debounce: Duration,
    metrics: &Metrics,
) {
    match event {
        ChangeEvent::MessageInserted(message) => {
            metrics.events_total.add(1, &[KeyValue::new("kind", "message_inserted")]);
            match write_state(state).ingest_remote_message(message, user) {
                IngestOutcome::Appended => {}
                IngestOutcome::Duplicate => {
                    metrics.duplicates_discarded_total.add(1, &[]);
                }
                // A counterpart opened a thread we have not pulled yet; a
                // bare message row is not enough to materialize it.
                IngestOutcome::UnknownThread => arm_reload(reload_at, debounce),
            }
        }
        ChangeEvent::MessageUpdated(message) => {
            metrics.events_total.add(1, &[KeyValue::new("kind", "message_updated")]);
            // Only the read stamp is mutable; everything else is ignored.
            if let Some(read_at) = message.read_at {
                write_state(state).patch_read_receipt(message.thread_id, message.id, read_at);
            }
        }
        ChangeEvent::ThreadInserted(thread) => {
            metrics.events_total.add(1, &[KeyValue::new("kind", "thread_inserted")]);
            // The event row lacks the joined profile and listing, so an
            // unknown thread goes through the reload path too.
            if read_state(state).thread(thread.id).is_none() {
                arm_reload(reload_at, debounce);
            }
        }
        ChangeEvent::PresenceChanged(record) => {
            metrics.events_total.add(1, &[KeyValue::new("kind", "presence_changed")]);
            write_state(state).set_presence(record);
        }
    }
}

/// First trigger sets the deadline; bursts inside the window ride the same
/// reload instead of each forcing their own.
fn arm_reload(reload_at: &mut Option<Instant>, debounce: Duration) {
    if reload_at.is_none() {
        *reload_at = Some(Instant::now() + debounce);
    }
}
