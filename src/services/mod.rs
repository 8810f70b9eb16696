use crate::config::Config;
use crate::domain::{Message, Thread, ThreadSummary};
use crate::error::{ChatError, Result};
use crate::session::Session;
use crate::state::ChatState;
use crate::storage::ChatStore;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use uuid::Uuid;

pub mod message_service;
pub mod offer_service;
pub mod presence_service;
pub mod reconciler;
pub mod send_service;
pub mod thread_service;

pub use message_service::MessageService;
pub use offer_service::OfferService;
pub use presence_service::PresenceTracker;
pub use send_service::SendPipeline;
pub use thread_service::ThreadService;

use reconciler::Reconciler;

pub(crate) type SharedState = Arc<RwLock<ChatState>>;

/// State transitions never panic, so a poisoned lock only means a panic
/// elsewhere already unwound through a guard; the data is still coherent.
pub(crate) fn read_state(state: &SharedState) -> RwLockReadGuard<'_, ChatState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_state(state: &SharedState) -> RwLockWriteGuard<'_, ChatState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Caps an interactive store call so a hung backend surfaces as a retryable
/// error instead of a frozen screen.
pub(crate) async fn with_timeout<T>(
    secs: u64,
    fut: impl Future<Output = Result<T>> + Send,
) -> Result<T> {
    (tokio::time::timeout(Duration::from_secs(secs), fut).await)
        .map_or(Err(ChatError::Timeout), |result| result)
}

/// The chat synchronization core: wires the store, session, and shared state
/// together, spawns the change-event reconciler, and exposes the operations
/// and read-only snapshots the UI consumes.
#[derive(Debug)]
pub struct ChatCore {
    session: Session,
    state: SharedState,
    pub threads: ThreadService,
    pub messages: MessageService,
    pub send: SendPipeline,
    pub presence: PresenceTracker,
    pub offers: OfferService,
    _reconciler: Reconciler,
}

impl ChatCore {
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, config: &Config) -> Self {
        let session = Session::new();
        let state: SharedState = Arc::new(RwLock::new(ChatState::new()));
        let timeout_secs = config.sync.store_timeout_secs;

        let reconciler = Reconciler::spawn(
            Arc::clone(&store),
            Arc::clone(&state),
            &session,
            config.sync.clone(),
        );

        Self {
            threads: ThreadService::new(
                Arc::clone(&store),
                Arc::clone(&state),
                session.clone(),
                timeout_secs,
            ),
            messages: MessageService::new(Arc::clone(&store), Arc::clone(&state), timeout_secs),
            send: SendPipeline::new(
                Arc::clone(&store),
                Arc::clone(&state),
                session.clone(),
                timeout_secs,
            ),
            presence: PresenceTracker::new(
                Arc::clone(&store),
                Arc::clone(&state),
                config.presence.clone(),
            ),
            offers: OfferService::new(store, session.clone(), timeout_secs),
            session,
            state,
            _reconciler: reconciler,
        }
    }

    /// Starts a session: publishes the identity (which scopes the reconciler
    /// subscription) and begins the presence heartbeat.
    pub async fn sign_in(&self, user_id: Uuid) {
        self.session.sign_in(user_id);
        self.presence.start(user_id).await;
    }

    /// Ends the session: best-effort offline heartbeat, then identity
    /// teardown, which drops the event subscription and clears local state.
    pub async fn sign_out(&self) {
        if let Some(user_id) = self.session.current_user() {
            self.presence.stop(user_id).await;
        }
        self.session.sign_out();
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn current_user(&self) -> Option<Uuid> {
        self.session.current_user()
    }

    // Read-only snapshots for the UI.

    #[must_use]
    pub fn threads_snapshot(&self) -> Vec<Thread> {
        read_state(&self.state).threads().to_vec()
    }

    /// Thread list joined with cached profiles/listings for the signed-in
    /// user; empty when signed out.
    #[must_use]
    pub fn thread_summaries(&self) -> Vec<ThreadSummary> {
        self.session
            .current_user()
            .map_or_else(Vec::new, |user| read_state(&self.state).summaries(user))
    }

    #[must_use]
    pub fn messages_snapshot(&self, thread_id: Uuid) -> Vec<Message> {
        read_state(&self.state).messages_for(thread_id).to_vec()
    }

    #[must_use]
    pub fn is_user_online(&self, user_id: Uuid) -> bool {
        read_state(&self.state).is_online(user_id)
    }
}
