//! Session identity and the authoritative session registry.
//!
//! A session is identified by a six-part composite key (local and remote
//! comp/sub/location ids). The registry maps each distinct key onto a compact
//! [`SurrogateId`] for the lifetime of one gateway instance and tracks the
//! lifecycle state of the record behind it.

pub mod error;
pub mod key;
pub mod registry;
pub mod state;
pub mod subscription;

pub use {
    error::RegistryError,
    key::{LibraryId, PartyId, SessionKey, SurrogateId},
    registry::{SessionRecord, SessionRegistry},
    state::{LifecycleEvent, SessionState},
    subscription::InterestPolicy,
};
