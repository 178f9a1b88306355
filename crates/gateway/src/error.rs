use fixgate_sessions::{LibraryId, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("no session exists handler registered for library {0}")]
    NoHandler(LibraryId),

    #[error("library {0} is already attached")]
    AlreadyAttached(LibraryId),

    #[error("attached library limit of {0} reached")]
    LibraryLimitReached(usize),

    #[error("library {0} is not attached")]
    UnknownLibrary(LibraryId),
}

impl GatewayError {
    /// Whether the gateway has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Registry(e) if e.is_fatal())
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
