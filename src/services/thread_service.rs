use crate::domain::{NewThread, Thread, ThreadSummary, canonical_pair};
use crate::error::Result;
use crate::services::{SharedState, read_state, with_timeout, write_state};
use crate::session::Session;
use crate::storage::ChatStore;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Thread lookup and creation, plus the read-marking side of the unread
/// counter. Creation is idempotent: one thread per (listing, buyer, seller)
/// triple and one per canonical direct pair.
#[derive(Debug, Clone)]
pub struct ThreadService {
    store: Arc<dyn ChatStore>,
    state: SharedState,
    session: Session,
    timeout_secs: u64,
}

/// Fetches the full thread list and swaps it into the shared state. Used by
/// the listing path and by the reconciler's debounced reload.
pub(crate) async fn refresh_threads(
    store: &Arc<dyn ChatStore>,
    state: &SharedState,
    user_id: Uuid,
    timeout_secs: u64,
) -> Result<()> {
    let summaries = with_timeout(timeout_secs, store.fetch_threads_for_user(user_id)).await?;
    write_state(state).replace_threads(summaries);
    Ok(())
}

impl ThreadService {
    pub(crate) const fn new(
        store: Arc<dyn ChatStore>,
        state: SharedState,
        session: Session,
        timeout_secs: u64,
    ) -> Self {
        Self { store, state, session, timeout_secs }
    }

    /// All threads where the user is buyer or seller, most recent first. A
    /// remote failure degrades to an empty list so the caller can render "no
    /// conversations" instead of an error.
    #[tracing::instrument(skip(self))]
    pub async fn list_threads_for_user(&self, user_id: Uuid) -> Vec<ThreadSummary> {
        match refresh_threads(&self.store, &self.state, user_id, self.timeout_secs).await {
            Ok(()) => read_state(&self.state).summaries(user_id),
            Err(e) => {
                tracing::warn!(error = %e, "thread list fetch failed, degrading to empty");
                Vec::new()
            }
        }
    }

    /// Local-cache lookup only; never triggers a remote fetch.
    #[must_use]
    pub fn get_thread_by_id(&self, thread_id: Uuid) -> Option<Thread> {
        read_state(&self.state).thread(thread_id).cloned()
    }

    /// Finds or creates the thread for a (listing, buyer, seller) triple.
    ///
    /// # Errors
    /// Propagates store failures; the caller must not treat creation as
    /// having succeeded.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn create_thread_for_listing(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Thread> {
        let existing = with_timeout(
            self.timeout_secs,
            self.store.find_listing_thread(listing_id, buyer_id, seller_id),
        )
        .await?;
        if let Some(thread) = existing {
            return Ok(thread);
        }
        self.insert_thread(NewThread { listing_id: Some(listing_id), buyer_id, seller_id }).await
    }

    /// Finds or creates the direct-message thread for an unordered user
    /// pair. `create_direct_thread(a, b)` and `create_direct_thread(b, a)`
    /// resolve to the same thread.
    ///
    /// # Errors
    /// Propagates store failures.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn create_direct_thread(&self, user_a: Uuid, user_b: Uuid) -> Result<Thread> {
        let (buyer_id, seller_id) = canonical_pair(user_a, user_b);
        let existing =
            with_timeout(self.timeout_secs, self.store.find_direct_thread(buyer_id, seller_id))
                .await?;
        if let Some(thread) = existing {
            return Ok(thread);
        }
        self.insert_thread(NewThread { listing_id: None, buyer_id, seller_id }).await
    }

    /// Zeroes the unread counter and stamps the counterpart's messages as
    /// read, locally first. The remote writes are best-effort: the local
    /// view is already correct and the next reload reconverges.
    #[tracing::instrument(skip(self))]
    pub async fn mark_thread_read(&self, thread_id: Uuid, user_id: Uuid) {
        let now = OffsetDateTime::now_utc();
        write_state(&self.state).mark_thread_read(thread_id, user_id, now);

        if let Err(e) = self.store.reset_unread(thread_id).await {
            tracing::warn!(error = %e, %thread_id, "remote unread reset failed");
        }
        if let Err(e) = self.store.mark_messages_read(thread_id, user_id, now).await {
            tracing::warn!(error = %e, %thread_id, "remote read-stamp write failed");
        }
    }

    async fn insert_thread(&self, new: NewThread) -> Result<Thread> {
        let thread = with_timeout(self.timeout_secs, self.store.insert_thread(new)).await?;
        write_state(&self.state).upsert_thread_front(thread.clone());
        self.hydrate_thread_context(&thread).await;
        Ok(thread)
    }

    /// Pulls the counterpart profile and listing for a freshly created
    /// thread into the cache. Secondary to the creation itself: a failure
    /// here only costs display data, so it is logged and swallowed.
    async fn hydrate_thread_context(&self, thread: &Thread) {
        let viewer = self.session.current_user().unwrap_or(thread.buyer_id);
        let counterpart = thread.counterpart(viewer);
        match self.store.fetch_profile(counterpart).await {
            Ok(Some(profile)) => write_state(&self.state).cache_profile(profile),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "counterpart profile fetch failed"),
        }
        if let Some(listing_id) = thread.listing_id {
            match self.store.fetch_listing(listing_id).await {
                Ok(Some(listing)) => write_state(&self.state).cache_listing(listing),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "listing fetch failed"),
            }
        }
    }
}
