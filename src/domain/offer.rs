use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// What the buyer puts on the table: cash, or one of their own listings as a
/// straight swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferTerms {
    Price { cents: i64 },
    Swap { listing_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub terms: OfferTerms,
    pub status: OfferStatus,
    pub created_at: OffsetDateTime,
}

impl Offer {
    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// Whether `responder` may move this offer to `next`. Accepting or
    /// declining is the seller's call on a pending offer; completing an
    /// accepted offer is open to either side.
    #[must_use]
    pub fn allows_transition(&self, responder: Uuid, next: OfferStatus) -> bool {
        match next {
            OfferStatus::Accepted | OfferStatus::Declined => {
                self.status == OfferStatus::Pending && responder == self.seller_id
            }
            OfferStatus::Completed => {
                self.status == OfferStatus::Accepted && self.is_participant(responder)
            }
            OfferStatus::Pending => false,
        }
    }
}

/// Insertable offer row; the store assigns id, timestamp, and pending status.
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub terms: OfferTerms,
}
