use crate::{
    key::SurrogateId,
    state::{LifecycleEvent, SessionState},
};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown surrogate id {0}")]
    UnknownHandle(SurrogateId),

    #[error("session {handle}: {event} is not legal from {from}")]
    InvalidTransition {
        handle: SurrogateId,
        from: SessionState,
        event: LifecycleEvent,
    },

    #[error("session {handle} is {state}; only terminated sessions can be evicted")]
    NotTerminated {
        handle: SurrogateId,
        state: SessionState,
    },

    /// Fatal: the gateway must be restarted with a larger handle space.
    #[error("surrogate id space exhausted (limit {limit})")]
    HandleSpaceExhausted { limit: u64 },
}

impl RegistryError {
    /// Whether the gateway can keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HandleSpaceExhausted { .. })
    }
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
