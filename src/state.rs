use crate::domain::{Listing, Message, PresenceRecord, Thread, ThreadSummary, UserProfile};
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;
use uuid::Uuid;

/// Outcome of feeding a remote message-insert event into the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The message id was already materialized; the event was discarded.
    Duplicate,
    /// Appended to a thread present in the local list; metadata was bumped.
    Appended,
    /// Appended, but the owning thread is not in the local list yet. The
    /// caller should schedule a thread-list reload.
    UnknownThread,
}

/// The single in-memory view the UI reads and all three event producers
/// write: the thread list (most-recent-first), per-thread message vectors,
/// per-thread seen-id sets, joined profile/listing caches, and presence.
///
/// Every mutation is a self-contained transition on `&mut self` so that two
/// events processed back-to-back can never observe a half-applied update,
/// and so each transition is testable without any I/O.
#[derive(Debug, Default)]
pub struct ChatState {
    threads: Vec<Thread>,
    profiles: HashMap<Uuid, UserProfile>,
    listings: HashMap<Uuid, Listing>,
    messages: HashMap<Uuid, Vec<Message>>,
    seen_ids: HashMap<Uuid, HashSet<Uuid>>,
    loaded_threads: HashSet<Uuid>,
    presence: HashMap<Uuid, PresenceRecord>,
}

impl ChatState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything tied to the previous identity. Called on sign-out so
    /// a later session never reads another user's conversations.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // --- thread list ---

    /// Replaces the thread list from a full reload, keeping message caches.
    /// Threads are held most-recent-first.
    pub fn replace_threads(&mut self, summaries: Vec<ThreadSummary>) {
        let mut threads = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if let Some(profile) = summary.counterpart {
                self.profiles.insert(profile.id, profile);
            }
            if let Some(listing) = summary.listing {
                self.listings.insert(listing.id, listing);
            }
            threads.push(summary.thread);
        }
        threads.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        self.threads = threads;
    }

    /// Inserts a freshly created thread at the front, or refreshes it in
    /// place if it is already present (idempotent creates hit this path).
    pub fn upsert_thread_front(&mut self, thread: Thread) {
        self.threads.retain(|t| t.id != thread.id);
        self.threads.insert(0, thread);
    }

    pub fn cache_profile(&mut self, profile: UserProfile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn cache_listing(&mut self, listing: Listing) {
        self.listings.insert(listing.id, listing);
    }

    #[must_use]
    pub fn thread(&self, thread_id: Uuid) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == thread_id)
    }

    #[must_use]
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// The thread list joined with cached counterpart profiles and listings,
    /// from `viewer`'s point of view.
    #[must_use]
    pub fn summaries(&self, viewer: Uuid) -> Vec<ThreadSummary> {
        self.threads
            .iter()
            .map(|thread| ThreadSummary {
                counterpart: self.profiles.get(&thread.counterpart(viewer)).cloned(),
                listing: thread.listing_id.and_then(|id| self.listings.get(&id)).cloned(),
                thread: thread.clone(),
            })
            .collect()
    }

    // --- messages ---

    #[must_use]
    pub fn messages_for(&self, thread_id: Uuid) -> &[Message] {
        self.messages.get(&thread_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn history_loaded(&self, thread_id: Uuid) -> bool {
        self.loaded_threads.contains(&thread_id)
    }

    /// Installs a fetched message history, merging in any rows that already
    /// arrived through the event stream before the fetch completed. Fetched
    /// rows win on conflict, except that a locally known read stamp is never
    /// regressed to unread.
    pub fn install_history(&mut self, thread_id: Uuid, fetched: Vec<Message>) {
        let cached = self.messages.remove(&thread_id).unwrap_or_default();
        let cached_by_id: HashMap<Uuid, Message> =
            cached.into_iter().map(|m| (m.id, m)).collect();

        let mut merged: Vec<Message> = Vec::with_capacity(fetched.len());
        let mut ids: HashSet<Uuid> = HashSet::with_capacity(fetched.len());
        for mut message in fetched {
            if message.read_at.is_none() {
                if let Some(prior) = cached_by_id.get(&message.id) {
                    message.read_at = prior.read_at;
                }
            }
            ids.insert(message.id);
            merged.push(message);
        }
        merged.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        for (id, message) in cached_by_id {
            if ids.insert(id) {
                insert_sorted(&mut merged, message);
            }
        }

        self.seen_ids.insert(thread_id, ids);
        self.messages.insert(thread_id, merged);
        self.loaded_threads.insert(thread_id);
    }

    /// Applies a remote message-insert event. The seen-id set is the sole
    /// guard against the race between the local send response and the remote
    /// event for the same row, in either arrival order.
    pub fn ingest_remote_message(&mut self, message: Message, current_user: Uuid) -> IngestOutcome {
        let thread_id = message.thread_id;
        if !self.seen_ids.entry(thread_id).or_default().insert(message.id) {
            return IngestOutcome::Duplicate;
        }

        let from_counterpart = message.sender_id != current_user;
        let created_at = message.created_at;
        insert_sorted(self.messages.entry(thread_id).or_default(), message);

        if self.bump_thread(thread_id, created_at, from_counterpart) {
            IngestOutcome::Appended
        } else {
            IngestOutcome::UnknownThread
        }
    }

    /// Appends this client's own just-persisted message, unless the remote
    /// insert event beat the send response to it. Never touches the unread
    /// counter: your own messages are not unread for you.
    pub fn append_local_echo(&mut self, message: Message) -> bool {
        let thread_id = message.thread_id;
        if !self.seen_ids.entry(thread_id).or_default().insert(message.id) {
            return false;
        }
        let created_at = message.created_at;
        insert_sorted(self.messages.entry(thread_id).or_default(), message);
        self.bump_thread(thread_id, created_at, false);
        true
    }

    /// Sets a message's read stamp. One-directional: an already-read message
    /// is left untouched, so replayed or late events cannot unset it.
    pub fn patch_read_receipt(
        &mut self,
        thread_id: Uuid,
        message_id: Uuid,
        read_at: OffsetDateTime,
    ) -> bool {
        let Some(list) = self.messages.get_mut(&thread_id) else {
            return false;
        };
        match list.iter_mut().find(|m| m.id == message_id) {
            Some(message) if message.read_at.is_none() => {
                message.read_at = Some(read_at);
                true
            }
            _ => false,
        }
    }

    /// Zeroes the unread counter and stamps every cached message not sent by
    /// `reader` as read, without waiting for server confirmation.
    pub fn mark_thread_read(&mut self, thread_id: Uuid, reader: Uuid, now: OffsetDateTime) {
        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) {
            thread.unread_count = 0;
        }
        if let Some(list) = self.messages.get_mut(&thread_id) {
            for message in list.iter_mut() {
                if message.sender_id != reader && message.read_at.is_none() {
                    message.read_at = Some(now);
                }
            }
        }
    }

    // --- presence ---

    /// Last-writer-wins overwrite; only the flag matters for display.
    pub fn set_presence(&mut self, record: PresenceRecord) {
        self.presence.insert(record.user_id, record);
    }

    #[must_use]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.presence.get(&user_id).is_some_and(|r| r.online)
    }

    /// Bumps a thread's last-message pointer and unread counter and moves it
    /// to the front. Returns false if the thread is not in the local list.
    fn bump_thread(
        &mut self,
        thread_id: Uuid,
        message_at: OffsetDateTime,
        count_unread: bool,
    ) -> bool {
        let Some(pos) = self.threads.iter().position(|t| t.id == thread_id) else {
            return false;
        };
        let mut thread = self.threads.remove(pos);
        if message_at > thread.last_message_at {
            thread.last_message_at = message_at;
        }
        if count_unread {
            thread.unread_count += 1;
        }
        self.threads.insert(0, thread);
        true
    }
}

/// Inserts by ascending creation time without disturbing existing order;
/// equal timestamps keep arrival order.
fn insert_sorted(list: &mut Vec<Message>, message: Message) {
    let pos = list
        .iter()
        .rposition(|m| m.created_at <= message.created_at)
        .map_or(0, |p| p + 1);
    list.insert(pos, message);
}
