use std::collections::HashSet;

use crate::schema::{FixgateConfig, MAX_ATTACHED_LIBRARIES};

/// A problem found in a loaded config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigIssue {
    #[error("gateway.queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("gateway.max_surrogate_id must be at least 1")]
    EmptyHandleSpace,
    #[error("gateway.replay_timeout_ms must be at least 1")]
    ZeroReplayTimeout,
    #[error("gateway.max_libraries must be between 1 and {MAX_ATTACHED_LIBRARIES}, got {0}")]
    LibraryLimitOutOfRange(usize),
    #[error("library id {0} is registered more than once")]
    DuplicateLibrary(i32),
}

/// Check a config for values the gateway cannot run with.
pub fn validate(config: &FixgateConfig) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let gw = &config.gateway;
    if gw.queue_capacity == 0 {
        issues.push(ConfigIssue::ZeroQueueCapacity);
    }
    if gw.max_surrogate_id == 0 {
        issues.push(ConfigIssue::EmptyHandleSpace);
    }
    if gw.replay_timeout_ms == 0 {
        issues.push(ConfigIssue::ZeroReplayTimeout);
    }
    if gw.max_libraries == 0 || gw.max_libraries > MAX_ATTACHED_LIBRARIES {
        issues.push(ConfigIssue::LibraryLimitOutOfRange(gw.max_libraries));
    }

    let mut seen = HashSet::new();
    for lib in &config.libraries {
        if !seen.insert(lib.id) {
            issues.push(ConfigIssue::DuplicateLibrary(lib.id.0));
        }
    }
    issues
}
