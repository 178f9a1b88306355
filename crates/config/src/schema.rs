//! Config schema types (gateway limits, library registrations).

use std::time::Duration;

use {
    fixgate_sessions::{InterestPolicy, LibraryId},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixgateConfig {
    pub gateway: GatewayConfig,
    /// Libraries allowed to attach, one handler each.
    #[serde(rename = "library")]
    pub libraries: Vec<LibraryEntry>,
}

impl FixgateConfig {
    pub fn library(&self, id: LibraryId) -> Option<&LibraryEntry> {
        self.libraries.iter().find(|l| l.id == id)
    }
}

/// What happens to a session record once it is terminated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Remove the record immediately after logout or timeout.
    #[default]
    Evict,
    /// Keep the terminated record until it is evicted explicitly or the
    /// identity logs on again.
    Retain,
}

/// Size of tokio's default blocking thread pool.
pub const MAX_ATTACHED_LIBRARIES: usize = 512;

/// Gateway-side limits for identity resolution and notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Capacity of each library's notification queue.
    pub queue_capacity: usize,
    /// Libraries that may be attached at once. Each attached library holds
    /// one thread of the runtime's blocking pool for its delivery worker, so
    /// this cannot exceed [`MAX_ATTACHED_LIBRARIES`].
    pub max_libraries: usize,
    /// Upper bound for a library attach replay, in milliseconds.
    pub replay_timeout_ms: u64,
    /// Largest surrogate id the gateway may allocate.
    pub max_surrogate_id: u64,
    pub retention: RetentionPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_libraries: MAX_ATTACHED_LIBRARIES,
            replay_timeout_ms: 5_000,
            max_surrogate_id: i64::MAX as u64,
            retention: RetentionPolicy::Evict,
        }
    }
}

impl GatewayConfig {
    pub fn replay_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_timeout_ms)
    }
}

/// A library registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: LibraryId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub interest: InterestPolicy,
}

impl LibraryEntry {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("library-{}", self.id))
    }
}
