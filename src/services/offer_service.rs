use crate::domain::{NewOffer, Offer, OfferStatus, OfferTerms};
use crate::error::{ChatError, Result};
use crate::services::with_timeout;
use crate::session::Session;
use crate::storage::ChatStore;
use std::sync::Arc;
use uuid::Uuid;

/// Offers on listings: cash or swap terms, pending → accepted/declined →
/// completed. Kept alongside the chat core because it shares the same
/// authorization shape as sending a message: advisory client checks, with
/// the store as the real gate.
#[derive(Debug, Clone)]
pub struct OfferService {
    store: Arc<dyn ChatStore>,
    session: Session,
    timeout_secs: u64,
}

impl OfferService {
    pub(crate) const fn new(store: Arc<dyn ChatStore>, session: Session, timeout_secs: u64) -> Self {
        Self { store, session, timeout_secs }
    }

    /// Places an offer on a listing on behalf of the signed-in buyer.
    ///
    /// # Errors
    /// `NoSession` when signed out, `NotParticipant` when `buyer_id` is not
    /// the session user, and store failures from the insert.
    #[tracing::instrument(err(level = "warn"), skip(self, terms))]
    pub async fn make_offer(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
        terms: OfferTerms,
    ) -> Result<Offer> {
        let session_user = self.session.current_user().ok_or(ChatError::NoSession)?;
        if session_user != buyer_id {
            return Err(ChatError::NotParticipant);
        }
        with_timeout(
            self.timeout_secs,
            self.store.insert_offer(NewOffer { listing_id, buyer_id, seller_id, terms }),
        )
        .await
    }

    /// Moves an offer through its status machine: accept/decline by the
    /// seller on a pending offer, complete by either side once accepted.
    ///
    /// # Errors
    /// `OfferNotFound`, `NotParticipant` for outsiders, `InvalidTransition`
    /// for a participant asking for a move the state machine forbids.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn respond_to_offer(
        &self,
        offer_id: Uuid,
        responder_id: Uuid,
        status: OfferStatus,
    ) -> Result<Offer> {
        self.session.current_user().ok_or(ChatError::NoSession)?;
        let offer = with_timeout(self.timeout_secs, self.store.fetch_offer(offer_id))
            .await?
            .ok_or(ChatError::OfferNotFound)?;

        if !offer.allows_transition(responder_id, status) {
            return Err(if offer.is_participant(responder_id) {
                ChatError::InvalidTransition
            } else {
                ChatError::NotParticipant
            });
        }
        with_timeout(self.timeout_secs, self.store.update_offer_status(offer_id, status)).await
    }

    /// Offers where the user is buyer or seller, newest first; a store
    /// failure degrades to an empty list.
    #[tracing::instrument(skip(self))]
    pub async fn list_offers_for_user(&self, user_id: Uuid) -> Vec<Offer> {
        match with_timeout(self.timeout_secs, self.store.fetch_offers_for_user(user_id)).await {
            Ok(offers) => offers,
            Err(e) => {
                tracing::warn!(error = %e, "offer list fetch failed, degrading to empty");
                Vec::new()
            }
        }
    }
}
