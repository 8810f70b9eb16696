use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The slice of a marketplace listing the chat UI needs: enough to render the
/// header of a listing-anchored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub price_cents: Option<i64>,
    pub image_url: Option<String>,
}
