use thiserror::Error;

/// Failure taxonomy for the chat core.
///
/// Read paths generally swallow `Store` errors and degrade to empty results;
/// write paths propagate. `PermissionDenied` is kept distinct from `Store` so
/// callers can show a meaningful message instead of a generic failure.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("message text is empty and no image is attached")]
    EmptyMessage,
    #[error("sender is not a participant in this conversation")]
    NotParticipant,
    #[error("no active session")]
    NoSession,
    #[error("conversation not found")]
    ThreadNotFound,
    #[error("offer not found")]
    OfferNotFound,
    #[error("offer is not in a state that allows this response")]
    InvalidTransition,
    #[error("permission denied by the store")]
    PermissionDenied,
    #[error("store error: {0}")]
    Store(String),
    #[error("store request timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Whether a retry of the same operation could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Timeout)
    }
}
