use crate::domain::{
    Listing, Message, NewMessage, NewOffer, NewThread, Offer, OfferStatus, PresenceRecord, Thread,
    ThreadSummary, UserProfile,
};
use crate::error::{ChatError, Result};
use crate::storage::{ChangeEvent, ChangeFeed, ChatStore, SubscriptionGuard};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Longer than any client-side timeout a test would configure.
const STALL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Subscriber {
    user_id: Uuid,
    tx: broadcast::Sender<ChangeEvent>,
}

/// Everything a thread/message event needs to decide who hears it.
enum Audience {
    Pair(Uuid, Uuid),
    Everyone,
}

/// In-memory reference implementation of [`ChatStore`].
///
/// Backs the integration tests and any embedding that wants to run the core
/// without a remote backend. It enforces the same row-level rules a real
/// store must: only thread participants may insert messages, and unread
/// increments are atomic. The `set_fail_*` switches inject failures so the
/// degraded read paths and best-effort secondary writes can be exercised.
#[derive(Debug)]
pub struct MemoryStore {
    threads: DashMap<Uuid, Thread>,
    messages: DashMap<Uuid, Message>,
    offers: DashMap<Uuid, Offer>,
    presence: DashMap<Uuid, PresenceRecord>,
    profiles: DashMap<Uuid, UserProfile>,
    listings: DashMap<Uuid, Listing>,
    subscribers: Arc<DashMap<u64, Subscriber>>,
    next_subscriber: AtomicU64,
    thread_list_fetches: AtomicU64,
    channel_capacity: usize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_metadata_writes: AtomicBool,
    stall_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            threads: DashMap::new(),
            messages: DashMap::new(),
            offers: DashMap::new(),
            presence: DashMap::new(),
            profiles: DashMap::new(),
            listings: DashMap::new(),
            subscribers: Arc::new(DashMap::new()),
            next_subscriber: AtomicU64::new(0),
            thread_list_fetches: AtomicU64::new(0),
            channel_capacity,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_metadata_writes: AtomicBool::new(false),
            stall_writes: AtomicBool::new(false),
        }
    }

    pub fn upsert_profile(&self, profile: UserProfile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn upsert_listing(&self, listing: Listing) {
        self.listings.insert(listing.id, listing);
    }

    /// Fail all read operations with a transient store error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail primary writes (thread/message/offer inserts, presence).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only the thread-metadata writes that follow a message insert.
    pub fn set_fail_metadata_writes(&self, fail: bool) {
        self.fail_metadata_writes.store(fail, Ordering::SeqCst);
    }

    /// Stall inserts well past any client-side timeout, simulating a hung
    /// backend rather than a failing one.
    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// How many times the thread-list query has run; lets tests verify that
    /// a burst of unknown-thread events coalesces into a single reload.
    #[must_use]
    pub fn thread_list_fetches(&self) -> u64 {
        self.thread_list_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn stored_thread(&self, thread_id: Uuid) -> Option<Thread> {
        self.threads.get(&thread_id).map(|t| t.clone())
    }

    #[must_use]
    pub fn presence_record(&self, user_id: Uuid) -> Option<PresenceRecord> {
        self.presence.get(&user_id).map(|r| r.clone())
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ChatError::Store("injected read failure".into()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ChatError::Store("injected write failure".into()));
        }
        Ok(())
    }

    async fn stall_if_requested(&self) {
        if self.stall_writes.load(Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
    }

    fn check_metadata_writes(&self) -> Result<()> {
        if self.fail_metadata_writes.load(Ordering::SeqCst) {
            return Err(ChatError::Store("injected metadata write failure".into()));
        }
        Ok(())
    }

    fn publish(&self, event: &ChangeEvent, audience: &Audience) {
        for entry in self.subscribers.iter() {
            let heard = match audience {
                Audience::Pair(a, b) => entry.user_id == *a || entry.user_id == *b,
                Audience::Everyone => true,
            };
            if heard {
                // A send error only means this subscriber is gone already.
                let _ = entry.tx.send(event.clone());
            }
        }
    }

    fn summarize(&self, thread: Thread, viewer: Uuid) -> ThreadSummary {
        let counterpart = self.profiles.get(&thread.counterpart(viewer)).map(|p| p.clone());
        let listing = thread.listing_id.and_then(|id| self.listings.get(&id).map(|l| l.clone()));
        ThreadSummary { thread, counterpart, listing }
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn fetch_threads_for_user(&self, user_id: Uuid) -> Result<Vec<ThreadSummary>> {
        self.thread_list_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_reads()?;
        let mut threads: Vec<Thread> = self
            .threads
            .iter()
            .filter(|t| t.is_participant(user_id))
            .map(|t| t.clone())
            .collect();
        threads.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(threads.into_iter().map(|t| self.summarize(t, user_id)).collect())
    }

    async fn find_listing_thread(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Option<Thread>> {
        self.check_reads()?;
        Ok(self
            .threads
            .iter()
            .find(|t| {
                t.listing_id == Some(listing_id)
                    && t.buyer_id == buyer_id
                    && t.seller_id == seller_id
            })
            .map(|t| t.clone()))
    }

    async fn find_direct_thread(&self, buyer_id: Uuid, seller_id: Uuid) -> Result<Option<Thread>> {
        self.check_reads()?;
        Ok(self
            .threads
            .iter()
            .find(|t| t.listing_id.is_none() && t.buyer_id == buyer_id && t.seller_id == seller_id)
            .map(|t| t.clone()))
    }

    async fn insert_thread(&self, thread: NewThread) -> Result<Thread> {
        self.stall_if_requested().await;
        self.check_writes()?;
        let row = Thread {
            id: Uuid::new_v4(),
            listing_id: thread.listing_id,
            buyer_id: thread.buyer_id,
            seller_id: thread.seller_id,
            last_message_at: OffsetDateTime::now_utc(),
            unread_count: 0,
        };
        self.threads.insert(row.id, row.clone());
        self.publish(
            &ChangeEvent::ThreadInserted(row.clone()),
            &Audience::Pair(row.buyer_id, row.seller_id),
        );
        Ok(row)
    }

    async fn fetch_messages(&self, thread_id: Uuid) -> Result<Vec<Message>> {
        self.check_reads()?;
        let mut rows: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .map(|m| m.clone())
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        self.stall_if_requested().await;
        self.check_writes()?;
        let thread =
            self.threads.get(&message.thread_id).ok_or(ChatError::ThreadNotFound)?.clone();
        // Row-level rule: only participants may write into a thread.
        if !thread.is_participant(message.sender_id) {
            return Err(ChatError::PermissionDenied);
        }
        let row = Message {
            id: Uuid::new_v4(),
            thread_id: message.thread_id,
            sender_id: message.sender_id,
            text: message.text,
            image_url: message.image_url,
            created_at: OffsetDateTime::now_utc(),
            read_at: None,
        };
        self.messages.insert(row.id, row.clone());
        self.publish(
            &ChangeEvent::MessageInserted(row.clone()),
            &Audience::Pair(thread.buyer_id, thread.seller_id),
        );
        Ok(row)
    }

    async fn mark_messages_read(
        &self,
        thread_id: Uuid,
        reader_id: Uuid,
        read_at: OffsetDateTime,
    ) -> Result<()> {
        self.check_writes()?;
        let thread = self.threads.get(&thread_id).ok_or(ChatError::ThreadNotFound)?.clone();
        let mut updated = Vec::new();
        for mut entry in self.messages.iter_mut() {
            if entry.thread_id == thread_id
                && entry.sender_id != reader_id
                && entry.read_at.is_none()
            {
                entry.read_at = Some(read_at);
                updated.push(entry.clone());
            }
        }
        for row in updated {
            self.publish(
                &ChangeEvent::MessageUpdated(row),
                &Audience::Pair(thread.buyer_id, thread.seller_id),
            );
        }
        Ok(())
    }

    async fn touch_thread(&self, thread_id: Uuid, at: OffsetDateTime) -> Result<()> {
        self.check_metadata_writes()?;
        let mut thread = self.threads.get_mut(&thread_id).ok_or(ChatError::ThreadNotFound)?;
        if at > thread.last_message_at {
            thread.last_message_at = at;
        }
        Ok(())
    }

    async fn increment_unread(&self, thread_id: Uuid) -> Result<()> {
        self.check_metadata_writes()?;
        // The entry lock makes this an atomic increment, not read-then-write.
        let mut thread = self.threads.get_mut(&thread_id).ok_or(ChatError::ThreadNotFound)?;
        thread.unread_count += 1;
        Ok(())
    }

    async fn reset_unread(&self, thread_id: Uuid) -> Result<()> {
        self.check_metadata_writes()?;
        let mut thread = self.threads.get_mut(&thread_id).ok_or(ChatError::ThreadNotFound)?;
        thread.unread_count = 0;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.check_reads()?;
        Ok(self.profiles.get(&user_id).map(|p| p.clone()))
    }

    async fn fetch_listing(&self, listing_id: Uuid) -> Result<Option<Listing>> {
        self.check_reads()?;
        Ok(self.listings.get(&listing_id).map(|l| l.clone()))
    }

    async fn write_presence(
        &self,
        user_id: Uuid,
        online: bool,
        last_seen: OffsetDateTime,
    ) -> Result<()> {
        self.check_writes()?;
        let record = PresenceRecord { user_id, online, last_seen };
        self.presence.insert(user_id, record.clone());
        self.publish(&ChangeEvent::PresenceChanged(record), &Audience::Everyone);
        Ok(())
    }

    async fn insert_offer(&self, offer: NewOffer) -> Result<Offer> {
        self.stall_if_requested().await;
        self.check_writes()?;
        let row = Offer {
            id: Uuid::new_v4(),
            listing_id: offer.listing_id,
            buyer_id: offer.buyer_id,
            seller_id: offer.seller_id,
            terms: offer.terms,
            status: OfferStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
        };
        self.offers.insert(row.id, row.clone());
        Ok(row)
    }

    async fn fetch_offer(&self, offer_id: Uuid) -> Result<Option<Offer>> {
        self.check_reads()?;
        Ok(self.offers.get(&offer_id).map(|o| o.clone()))
    }

    async fn update_offer_status(&self, offer_id: Uuid, status: OfferStatus) -> Result<Offer> {
        self.check_writes()?;
        let mut offer = self.offers.get_mut(&offer_id).ok_or(ChatError::OfferNotFound)?;
        offer.status = status;
        Ok(offer.clone())
    }

    async fn fetch_offers_for_user(&self, user_id: Uuid) -> Result<Vec<Offer>> {
        self.check_reads()?;
        let mut rows: Vec<Offer> =
            self.offers.iter().filter(|o| o.is_participant(user_id)).map(|o| o.clone()).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn subscribe(&self, user_id: Uuid) -> Result<ChangeFeed> {
        let (tx, rx) = broadcast::channel(self.channel_capacity);
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers.insert(id, Subscriber { user_id, tx });

        let subscribers = Arc::clone(&self.subscribers);
        let guard = SubscriptionGuard::new(move || {
            subscribers.remove(&id);
        });
        Ok(ChangeFeed::new(rx, guard))
    }
}
