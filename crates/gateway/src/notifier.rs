//! Session existence notification.
//!
//! Entry points called by the protocol layer when a logon is accepted or a
//! library connects. Each resolves identities through the registry and
//! fans existence events out to interested library proxies. Fan-out never
//! waits on a library: live events use non-blocking queueing and attach
//! replays run on their own task with a deadline.

use std::{collections::HashMap, time::Duration};

use {
    fixgate_config::RetentionPolicy,
    fixgate_sessions::{
        InterestPolicy, LibraryId, LifecycleEvent, SessionKey, SessionRegistry, SessionState,
        SurrogateId,
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{GatewayError, Result},
    handler::LibraryRef,
    library::{DeliveryChannel, ExistenceEvent, LibraryProxy, Offer},
    state::GatewayState,
};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    Logout,
    Timeout,
}

impl From<LogoutReason> for LifecycleEvent {
    fn from(reason: LogoutReason) -> Self {
        match reason {
            LogoutReason::Logout => Self::Logout,
            LogoutReason::Timeout => Self::Timeout,
        }
    }
}

/// A logon has been validated and accepted for `key`.
///
/// Resolves (or allocates) the surrogate id, marks the session active and
/// tells every interested library. Repeat calls for an already active
/// identity return the same id and notify nobody twice.
pub async fn on_logon_accepted(state: &GatewayState, key: SessionKey) -> Result<SurrogateId> {
    let mut registry = state.registry.write().await;
    let id = registry.resolve(&key).inspect_err(|e| {
        if e.is_fatal() {
            error!(session = %key, error = %e, "cannot allocate surrogate id");
        }
    })?;
    registry.transition(id, LifecycleEvent::LogonAccepted)?;
    info!(handle = %id, session = %key, "logon accepted");

    let libraries = state.libraries.read().await;
    fan_out(&registry, &libraries, id);
    Ok(id)
}

/// A library has connected with `interest`.
///
/// Requires a handler registered through
/// [`GatewayState::register_handler`]. The library is told about every
/// matching session the gateway already holds, in ascending id order, on a
/// replay task bounded by the configured replay timeout. With
/// [`InterestPolicy::Owned`] its disconnected sessions are reattached first.
pub async fn on_library_attached(
    state: &GatewayState,
    library_id: LibraryId,
    interest: InterestPolicy,
) -> Result<LibraryRef> {
    let registration = state
        .handler(library_id)
        .ok_or(GatewayError::NoHandler(library_id))?;

    let mut registry = state.registry.write().await;
    let mut libraries = state.libraries.write().await;
    if libraries.contains_key(&library_id) {
        return Err(GatewayError::AlreadyAttached(library_id));
    }
    if libraries.len() >= state.config.max_libraries {
        warn!(library = %library_id, limit = state.config.max_libraries, "attach refused, library limit reached");
        return Err(GatewayError::LibraryLimitReached(state.config.max_libraries));
    }

    let proxy = LibraryProxy::spawn(
        registration.library.clone(),
        interest,
        registration.handler,
        state.ledger(library_id),
        state.stats_for(library_id),
        state.config.queue_capacity,
    );

    if interest == InterestPolicy::Owned {
        let orphaned: Vec<_> = registry
            .records_matching(|r| {
                r.owner == Some(library_id) && r.state == SessionState::Disconnected
            })
            .into_iter()
            .map(|r| r.id)
            .collect();
        for id in orphaned {
            registry.transition(id, LifecycleEvent::LibraryAttached)?;
            debug!(handle = %id, library = %library_id, "session reattached");
        }
    }

    let replay: Vec<ExistenceEvent> = registry
        .records_matching(|r| proxy.wants(r))
        .into_iter()
        .map(ExistenceEvent::from_record)
        .collect();
    let channel = proxy.channel();
    libraries.insert(library_id, proxy);
    drop(libraries);
    drop(registry);

    info!(
        library = %registration.library,
        ?interest,
        sessions = replay.len(),
        "library attached"
    );
    spawn_replay(channel, replay, state.config.replay_timeout());
    Ok(registration.library)
}

/// A library takes ownership of a session.
pub async fn acquire_session(
    state: &GatewayState,
    id: SurrogateId,
    library_id: LibraryId,
) -> Result<()> {
    let mut registry = state.registry.write().await;
    let libraries = state.libraries.read().await;
    if !libraries.contains_key(&library_id) {
        return Err(GatewayError::UnknownLibrary(library_id));
    }
    registry.transition(id, LifecycleEvent::LibraryAttached)?;
    registry.set_owner(id, Some(library_id))?;
    debug!(handle = %id, library = %library_id, "session acquired");
    fan_out(&registry, &libraries, id);
    Ok(())
}

/// A library has gone away.
///
/// Its queued events are discarded, and the active sessions it owned become
/// disconnected until it, or another library, picks them up again.
pub async fn on_library_detached(state: &GatewayState, library_id: LibraryId) -> Result<()> {
    let mut registry = state.registry.write().await;
    let proxy = state
        .libraries
        .write()
        .await
        .remove(&library_id)
        .ok_or(GatewayError::UnknownLibrary(library_id))?;
    // The worker drains and exits on its own once the proxy is closed.
    drop(proxy.close());

    let owned: Vec<_> = registry
        .records_matching(|r| r.owner == Some(library_id) && r.state == SessionState::Active)
        .into_iter()
        .map(|r| r.id)
        .collect();
    for id in &owned {
        registry.transition(*id, LifecycleEvent::LibraryDetached)?;
    }
    info!(library = %library_id, disconnected = owned.len(), "library detached");
    Ok(())
}

/// A session logged out or timed out. Terminated records are evicted right
/// away under [`RetentionPolicy::Evict`].
pub async fn on_logout(state: &GatewayState, id: SurrogateId, reason: LogoutReason) -> Result<()> {
    let mut registry = state.registry.write().await;
    registry.transition(id, reason.into())?;
    info!(handle = %id, ?reason, "session terminated");
    if state.config.retention == RetentionPolicy::Evict {
        evict_locked(state, &mut registry, id)?;
    }
    Ok(())
}

/// Remove a terminated session record.
pub async fn evict(state: &GatewayState, id: SurrogateId) -> Result<()> {
    let mut registry = state.registry.write().await;
    evict_locked(state, &mut registry, id)
}

fn evict_locked(state: &GatewayState, registry: &mut SessionRegistry, id: SurrogateId) -> Result<()> {
    let record = registry.evict(id)?;
    state.forget_handle_everywhere(id, record.epoch);
    Ok(())
}

/// Identity behind a surrogate id.
///
/// Unknown ids are logged and returned as an error for the caller to treat
/// as non-fatal.
pub async fn lookup(state: &GatewayState, id: SurrogateId) -> Result<SessionKey> {
    let registry = state.registry.read().await;
    match registry.lookup(id) {
        Ok(key) => Ok(key.clone()),
        Err(e) => {
            warn!(handle = %id, "lookup of unknown surrogate id");
            Err(e.into())
        },
    }
}

/// Offer the record's existence to every proxy interested in it. Caller
/// holds the registry lock so per-library order follows registry order.
fn fan_out(
    registry: &SessionRegistry,
    libraries: &HashMap<LibraryId, LibraryProxy>,
    id: SurrogateId,
) {
    let Some(record) = registry.get(id) else {
        return;
    };
    let event = ExistenceEvent::from_record(record);
    let queued = libraries
        .values()
        .filter(|p| p.wants(record))
        .filter(|p| p.offer(event.clone()) == Offer::Queued)
        .count();
    if queued > 0 {
        debug!(handle = %record.id, epoch = record.epoch, libraries = queued, "existence event fanned out");
    }
}

fn spawn_replay(
    channel: DeliveryChannel,
    events: Vec<ExistenceEvent>,
    deadline: Duration,
) {
    if events.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let total = events.len();
        let mut sent = 0usize;
        let outcome = tokio::time::timeout(deadline, async {
            for event in events {
                match channel.send(event).await {
                    Offer::Queued => sent += 1,
                    Offer::AlreadyDelivered => {},
                    Offer::Dropped | Offer::Closed => return false,
                }
            }
            true
        })
        .await;

        match outcome {
            Ok(true) => {
                debug!(library = %channel.library(), sent, total, "replay complete");
            },
            Ok(false) => {
                channel.stats().record_replay_aborted();
                warn!(library = %channel.library(), sent, total, "replay aborted, library went away");
            },
            Err(_) => {
                channel.stats().record_replay_aborted();
                warn!(library = %channel.library(), sent, total, ?deadline, "replay timed out");
            },
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        super::*,
        crate::handler::handler_fn,
        fixgate_config::GatewayConfig,
        fixgate_sessions::{PartyId, RegistryError},
    };

    fn key(remote: &str) -> SessionKey {
        SessionKey::new(PartyId::comp("BRKR"), PartyId::comp(remote))
    }

    fn silent_state() -> Arc<GatewayState> {
        let state = GatewayState::new(GatewayConfig::default());
        state.register_handler(
            LibraryId(1),
            "silent",
            handler_fn(|_, _, _, _, _, _, _, _| Ok(())),
        );
        state
    }

    #[tokio::test]
    async fn attach_without_handler_fails() {
        let state = GatewayState::new(GatewayConfig::default());
        let err = on_library_attached(&state, LibraryId(9), InterestPolicy::All)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoHandler(LibraryId(9))));
    }

    #[tokio::test]
    async fn double_attach_fails() {
        let state = silent_state();
        on_library_attached(&state, LibraryId(1), InterestPolicy::All)
            .await
            .unwrap();
        let err = on_library_attached(&state, LibraryId(1), InterestPolicy::All)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyAttached(_)));
    }

    #[tokio::test]
    async fn attach_beyond_library_limit_fails() {
        let state = GatewayState::new(GatewayConfig {
            max_libraries: 1,
            ..GatewayConfig::default()
        });
        for id in [1, 2] {
            state.register_handler(
                LibraryId(id),
                "silent",
                handler_fn(|_, _, _, _, _, _, _, _| Ok(())),
            );
        }
        on_library_attached(&state, LibraryId(1), InterestPolicy::All)
            .await
            .unwrap();
        let err = on_library_attached(&state, LibraryId(2), InterestPolicy::All)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::LibraryLimitReached(1)));

        on_library_detached(&state, LibraryId(1)).await.unwrap();
        on_library_attached(&state, LibraryId(2), InterestPolicy::All)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn logout_evicts_by_default() {
        let state = silent_state();
        let id = on_logon_accepted(&state, key("A")).await.unwrap();
        on_logout(&state, id, LogoutReason::Logout).await.unwrap();
        let err = lookup(&state, id).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Registry(RegistryError::UnknownHandle(_))
        ));
    }

    #[tokio::test]
    async fn retained_sessions_stay_until_evicted() {
        let state = GatewayState::new(GatewayConfig {
            retention: RetentionPolicy::Retain,
            ..GatewayConfig::default()
        });
        let id = on_logon_accepted(&state, key("A")).await.unwrap();
        on_logout(&state, id, LogoutReason::Timeout).await.unwrap();
        assert_eq!(lookup(&state, id).await.unwrap(), key("A"));
        assert_eq!(
            state.registry.read().await.get(id).unwrap().state,
            SessionState::Terminated
        );

        let err = on_logout(&state, id, LogoutReason::Logout)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Registry(RegistryError::InvalidTransition { .. })
        ));

        evict(&state, id).await.unwrap();
        assert!(lookup(&state, id).await.is_err());
    }

    #[tokio::test]
    async fn exhausted_handle_space_is_fatal() {
        let state = GatewayState::new(GatewayConfig {
            max_surrogate_id: 1,
            ..GatewayConfig::default()
        });
        on_logon_accepted(&state, key("A")).await.unwrap();
        let err = on_logon_accepted(&state, key("B")).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn detach_disconnects_owned_sessions() {
        let state = silent_state();
        on_library_attached(&state, LibraryId(1), InterestPolicy::Owned)
            .await
            .unwrap();
        let id = on_logon_accepted(&state, key("A")).await.unwrap();
        acquire_session(&state, id, LibraryId(1)).await.unwrap();

        on_library_detached(&state, LibraryId(1)).await.unwrap();
        let record = state.registry.read().await.get(id).cloned().unwrap();
        assert_eq!(record.state, SessionState::Disconnected);
        assert_eq!(record.owner, Some(LibraryId(1)));
        assert!(!state.is_attached(LibraryId(1)).await);

        on_library_attached(&state, LibraryId(1), InterestPolicy::Owned)
            .await
            .unwrap();
        assert_eq!(
            state.registry.read().await.get(id).unwrap().state,
            SessionState::Active
        );
    }

    #[tokio::test]
    async fn acquire_requires_attached_library() {
        let state = silent_state();
        let id = on_logon_accepted(&state, key("A")).await.unwrap();
        let err = acquire_session(&state, id, LibraryId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownLibrary(LibraryId(1))));
    }

    #[tokio::test]
    async fn detach_unknown_library_fails() {
        let state = silent_state();
        assert!(matches!(
            on_library_detached(&state, LibraryId(5)).await,
            Err(GatewayError::UnknownLibrary(_))
        ));
    }
}
