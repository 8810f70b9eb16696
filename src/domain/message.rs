use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// One message in a thread. Immutable after insertion except `read_at`,
/// which transitions once from `None` to `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub read_at: Option<OffsetDateTime>,
}

impl Message {
    #[must_use]
    pub const fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Insertable message row; the store assigns id and creation timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub text: Option<String>,
    pub image_url: Option<String>,
}
