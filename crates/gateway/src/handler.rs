use std::{fmt, sync::Arc};

use fixgate_sessions::{LibraryId, SurrogateId};

/// The library a handler invocation is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRef {
    pub id: LibraryId,
    pub name: Arc<str>,
}

impl LibraryRef {
    pub fn new(id: LibraryId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for LibraryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Callback invoked when a library learns that a session exists.
///
/// Called either when a new logon is accepted on the gateway or when the
/// library attaches and is told about sessions the gateway already holds.
/// A missing sub id or location id is always passed as `""`.
pub trait SessionExistsHandler: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn on_session_exists(
        &self,
        library: &LibraryRef,
        surrogate_id: SurrogateId,
        local_comp_id: &str,
        local_sub_id: &str,
        local_location_id: &str,
        remote_comp_id: &str,
        remote_sub_id: &str,
        remote_location_id: &str,
    ) -> anyhow::Result<()>;
}

impl<F> SessionExistsHandler for F
where
    F: Fn(&LibraryRef, SurrogateId, &str, &str, &str, &str, &str, &str) -> anyhow::Result<()>
        + Send
        + Sync,
{
    #[allow(clippy::too_many_arguments)]
    fn on_session_exists(
        &self,
        library: &LibraryRef,
        surrogate_id: SurrogateId,
        local_comp_id: &str,
        local_sub_id: &str,
        local_location_id: &str,
        remote_comp_id: &str,
        remote_sub_id: &str,
        remote_location_id: &str,
    ) -> anyhow::Result<()> {
        self(
            library,
            surrogate_id,
            local_comp_id,
            local_sub_id,
            local_location_id,
            remote_comp_id,
            remote_sub_id,
            remote_location_id,
        )
    }
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn SessionExistsHandler>
where
    F: Fn(&LibraryRef, SurrogateId, &str, &str, &str, &str, &str, &str) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}
