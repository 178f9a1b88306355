use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Identity resolved, logon not yet accepted.
    Pending,
    /// Logon accepted or a library holds the session.
    Active,
    /// Owning library went away without a logout.
    Disconnected,
    /// Logged out or timed out. Final.
    Terminated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }

    /// Next state for `event`, or `None` if the event is illegal here.
    pub fn next(self, event: LifecycleEvent) -> Option<Self> {
        use {LifecycleEvent as E, SessionState as S};
        match (self, event) {
            (S::Terminated, _) => None,
            (_, E::Logout | E::Timeout) => Some(S::Terminated),
            (S::Pending | S::Active | S::Disconnected, E::LogonAccepted | E::LibraryAttached) => {
                Some(S::Active)
            },
            (S::Active, E::LibraryDetached) => Some(S::Disconnected),
            (S::Pending | S::Disconnected, E::LibraryDetached) => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Disconnected => "disconnected",
            Self::Terminated => "terminated",
        })
    }
}

/// Something that happened to a session, as reported by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    LogonAccepted,
    LibraryAttached,
    LibraryDetached,
    Logout,
    Timeout,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LogonAccepted => "logon_accepted",
            Self::LibraryAttached => "library_attached",
            Self::LibraryDetached => "library_detached",
            Self::Logout => "logout",
            Self::Timeout => "timeout",
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{LifecycleEvent as E, SessionState as S},
        rstest::rstest,
    };

    #[rstest]
    #[case(S::Pending, E::LogonAccepted, Some(S::Active))]
    #[case(S::Pending, E::LibraryAttached, Some(S::Active))]
    #[case(S::Pending, E::LibraryDetached, None)]
    #[case(S::Pending, E::Logout, Some(S::Terminated))]
    #[case(S::Active, E::LogonAccepted, Some(S::Active))]
    #[case(S::Active, E::LibraryDetached, Some(S::Disconnected))]
    #[case(S::Active, E::Timeout, Some(S::Terminated))]
    #[case(S::Disconnected, E::LibraryAttached, Some(S::Active))]
    #[case(S::Disconnected, E::LogonAccepted, Some(S::Active))]
    #[case(S::Disconnected, E::LibraryDetached, None)]
    #[case(S::Disconnected, E::Logout, Some(S::Terminated))]
    #[case(S::Terminated, E::LogonAccepted, None)]
    #[case(S::Terminated, E::LibraryAttached, None)]
    #[case(S::Terminated, E::Logout, None)]
    fn transitions(#[case] from: S, #[case] event: E, #[case] expected: Option<S>) {
        assert_eq!(from.next(event), expected);
    }

    #[test]
    fn only_terminated_is_terminal() {
        assert!(S::Terminated.is_terminal());
        assert!(!S::Pending.is_terminal());
        assert!(!S::Active.is_terminal());
        assert!(!S::Disconnected.is_terminal());
    }
}
