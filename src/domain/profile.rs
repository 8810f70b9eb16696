use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display data joined into thread summaries so the UI can label a
/// conversation without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub team_number: Option<u32>,
    pub avatar_url: Option<String>,
}
