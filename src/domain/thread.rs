use crate::domain::listing::Listing;
use crate::domain::profile::UserProfile;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A conversation between a buyer and a seller, optionally anchored to a
/// listing. Direct threads (`listing_id == None`) store their unordered user
/// pair canonically: the lower id always occupies the buyer slot, which makes
/// the one-thread-per-pair constraint enforceable with a plain unique index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub listing_id: Option<Uuid>,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub last_message_at: OffsetDateTime,
    pub unread_count: u32,
}

impl Thread {
    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The other party from `user_id`'s point of view. A caller that is not
    /// a participant at all gets the buyer slot.
    #[must_use]
    pub const fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.buyer_id.as_u128() == user_id.as_u128() { self.seller_id } else { self.buyer_id }
    }

    #[must_use]
    pub const fn is_direct(&self) -> bool {
        self.listing_id.is_none()
    }
}

/// Orders an unordered user pair into (buyer slot, seller slot).
#[must_use]
pub fn canonical_pair(user_a: Uuid, user_b: Uuid) -> (Uuid, Uuid) {
    if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) }
}

/// Insertable thread row; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub listing_id: Option<Uuid>,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
}

/// A thread joined with the viewer's counterpart profile and the listing it
/// hangs off, as the thread-list query returns it.
#[derive(Debug, Clone)]
pub struct ThreadSummary {
    pub thread: Thread,
    pub counterpart: Option<UserProfile>,
    pub listing: Option<Listing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(canonical_pair(a, b), canonical_pair(b, a));
    }

    #[test]
    fn test_canonical_pair_lower_id_takes_buyer_slot() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (buyer, seller) = canonical_pair(a, b);
        assert!(buyer <= seller);
    }

    #[test]
    fn test_counterpart() {
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let thread = Thread {
            id: Uuid::new_v4(),
            listing_id: None,
            buyer_id: buyer,
            seller_id: seller,
            last_message_at: OffsetDateTime::now_utc(),
            unread_count: 0,
        };
        assert_eq!(thread.counterpart(buyer), seller);
        assert_eq!(thread.counterpart(seller), buyer);
    }
}
