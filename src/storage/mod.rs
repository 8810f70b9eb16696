use crate::domain::{
    Listing, Message, NewMessage, NewOffer, NewThread, Offer, OfferStatus, PresenceRecord, Thread,
    ThreadSummary, UserProfile,
};
use crate::error::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod memory;

pub use memory::MemoryStore;

/// A row-level change pushed by the store. Thread and message events are
/// delivered only to subscribers who are a participant of the owning thread;
/// presence events go to every subscriber.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    ThreadInserted(Thread),
    MessageInserted(Message),
    /// Read-receipt transition; every field other than `read_at` is
    /// identical to the inserted row.
    MessageUpdated(Message),
    PresenceChanged(PresenceRecord),
}

/// The persistent-store contract the chat core consumes. Writes are each
/// independently atomic; nothing here spans tables transactionally.
/// `increment_unread` must be atomic at the store (no read-modify-write), so
/// concurrent senders cannot lose an increment.
#[async_trait]
pub trait ChatStore: Send + Sync + std::fmt::Debug {
    /// Threads where the user is buyer or seller, most recent first, joined
    /// with the counterpart profile and listing.
    async fn fetch_threads_for_user(&self, user_id: Uuid) -> Result<Vec<ThreadSummary>>;

    async fn find_listing_thread(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Option<Thread>>;

    /// Lookup keyed on `listing IS NULL`; expects the pair already in
    /// canonical order.
    async fn find_direct_thread(&self, buyer_id: Uuid, seller_id: Uuid) -> Result<Option<Thread>>;

    async fn insert_thread(&self, thread: NewThread) -> Result<Thread>;

    /// All messages in a thread, ascending by creation time.
    async fn fetch_messages(&self, thread_id: Uuid) -> Result<Vec<Message>>;

    /// Inserts a message. The store re-enforces participant authorization;
    /// the client-side check is advisory only.
    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// Stamps every unread message in the thread not sent by `reader`.
    async fn mark_messages_read(
        &self,
        thread_id: Uuid,
        reader_id: Uuid,
        read_at: OffsetDateTime,
    ) -> Result<()>;

    async fn touch_thread(&self, thread_id: Uuid, at: OffsetDateTime) -> Result<()>;

    async fn increment_unread(&self, thread_id: Uuid) -> Result<()>;

    async fn reset_unread(&self, thread_id: Uuid) -> Result<()>;

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    async fn fetch_listing(&self, listing_id: Uuid) -> Result<Option<Listing>>;

    async fn write_presence(
        &self,
        user_id: Uuid,
        online: bool,
        last_seen: OffsetDateTime,
    ) -> Result<()>;

    async fn insert_offer(&self, offer: NewOffer) -> Result<Offer>;

    async fn fetch_offer(&self, offer_id: Uuid) -> Result<Option<Offer>>;

    async fn update_offer_status(&self, offer_id: Uuid, status: OfferStatus) -> Result<Offer>;

    async fn fetch_offers_for_user(&self, user_id: Uuid) -> Result<Vec<Offer>>;

    /// Opens a change feed scoped to `user_id`. The feed unsubscribes when
    /// dropped.
    async fn subscribe(&self, user_id: Uuid) -> Result<ChangeFeed>;
}

/// A scoped change-feed subscription: dropping the feed releases the
/// store-side registration, so a dismounted or re-identified client cannot
/// leak a previous session's event stream.
pub struct ChangeFeed {
    rx: broadcast::Receiver<ChangeEvent>,
    _guard: SubscriptionGuard,
}

impl ChangeFeed {
    #[must_use]
    pub fn new(rx: broadcast::Receiver<ChangeEvent>, guard: SubscriptionGuard) -> Self {
        Self { rx, _guard: guard }
    }

    /// Next event, or `Lagged` if the receiver fell behind the channel
    /// capacity (the consumer should resynchronize with a full reload).
    ///
    /// # Errors
    /// Returns `broadcast::error::RecvError` on lag or channel closure.
    pub async fn recv(&mut self) -> std::result::Result<ChangeEvent, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed").finish_non_exhaustive()
    }
}

/// Runs its release action exactly once, on drop.
pub struct SubscriptionGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self { release: Some(Box::new(release)) }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard").finish_non_exhaustive()
    }
}
