pub mod listing;
pub mod message;
pub mod offer;
pub mod presence;
pub mod profile;
pub mod thread;

pub use listing::Listing;
pub use message::{Message, NewMessage};
pub use offer::{NewOffer, Offer, OfferStatus, OfferTerms};
pub use presence::PresenceRecord;
pub use profile::UserProfile;
pub use thread::{NewThread, Thread, ThreadSummary, canonical_pair};
