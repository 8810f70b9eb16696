use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Online flag plus the heartbeat that produced it. A user with no record at
/// all is simply offline; `last_seen` is recorded so that a server-side
/// expiry job can age out records from clients that died without a clean
/// offline write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub online: bool,
    pub last_seen: OffsetDateTime,
}
