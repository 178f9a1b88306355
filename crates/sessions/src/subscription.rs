use serde::{Deserialize, Serialize};

use crate::{
    key::LibraryId,
    registry::SessionRecord,
    state::SessionState,
};

/// Which session records a library wants existence events for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestPolicy {
    /// Every active session on the gateway.
    #[default]
    All,
    /// Only sessions this library owns, including disconnected ones it can
    /// reattach to.
    Owned,
}

impl InterestPolicy {
    /// Whether `library` with this policy should hear about `record`.
    pub fn matches(self, library: LibraryId, record: &SessionRecord) -> bool {
        match self {
            Self::All => record.state == SessionState::Active,
            Self::Owned => {
                record.owner == Some(library)
                    && matches!(record.state, SessionState::Active | SessionState::Disconnected)
            },
        }
    }
}
