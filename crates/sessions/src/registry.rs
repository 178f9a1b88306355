use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, trace};

use crate::{
    error::{RegistryError, Result},
    key::{LibraryId, SessionKey, SurrogateId},
    state::{LifecycleEvent, SessionState},
};

/// Authoritative record for one session identity.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub key: SessionKey,
    pub id: SurrogateId,
    pub state: SessionState,
    /// Library currently (or, when disconnected, last) holding the session.
    pub owner: Option<LibraryId>,
    /// Bumped every time a record is created for this id, so a record that
    /// was evicted or terminated and later recreated is distinguishable.
    pub epoch: u64,
}

impl SessionRecord {
    fn new(key: SessionKey, id: SurrogateId, epoch: u64) -> Self {
        Self {
            key,
            id,
            state: SessionState::Pending,
            owner: None,
            epoch,
        }
    }
}

/// Maps session identities onto surrogate ids and tracks their lifecycle.
///
/// All mutation goes through `&mut self`, so the owner decides the locking
/// discipline; the gateway keeps one registry behind a single `RwLock`.
/// The key → id map is never shrunk: once an identity has been seen it keeps
/// its id for the lifetime of the registry, even after its record is evicted.
pub struct SessionRegistry {
    /// key → surrogate id, permanent
    ids: HashMap<SessionKey, SurrogateId>,
    /// surrogate id → live record, ordered for deterministic replay
    records: BTreeMap<SurrogateId, SessionRecord>,
    next_id: u64,
    max_id: u64,
    next_epoch: u64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_limit(u64::MAX)
    }

    /// Registry that refuses to allocate ids above `max_id`.
    pub fn with_limit(max_id: u64) -> Self {
        Self {
            ids: HashMap::new(),
            records: BTreeMap::new(),
            next_id: 1,
            max_id,
            next_epoch: 1,
        }
    }

    /// Return the id for `key`, allocating one and creating a `Pending`
    /// record if the identity is new.
    ///
    /// A key whose record was evicted, or is sitting in `Terminated`, gets a
    /// fresh `Pending` record under its existing id with a new epoch.
    pub fn resolve(&mut self, key: &SessionKey) -> Result<SurrogateId> {
        let id = match self.ids.get(key) {
            Some(&id) => id,
            None => {
                let id = self.allocate()?;
                self.ids.insert(key.clone(), id);
                debug!(handle = %id, session = %key, "allocated surrogate id");
                id
            },
        };

        let stale = self
            .records
            .get(&id)
            .is_none_or(|r| r.state.is_terminal());
        if stale {
            let epoch = self.next_epoch;
            self.next_epoch += 1;
            self.records
                .insert(id, SessionRecord::new(key.clone(), id, epoch));
            trace!(handle = %id, epoch, "created session record");
        }
        Ok(id)
    }

    fn allocate(&mut self) -> Result<SurrogateId> {
        if self.next_id > self.max_id {
            error!(limit = self.max_id, "surrogate id space exhausted");
            return Err(RegistryError::HandleSpaceExhausted { limit: self.max_id });
        }
        let id = SurrogateId(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    /// Identity behind a live record.
    pub fn lookup(&self, id: SurrogateId) -> Result<&SessionKey> {
        self.records
            .get(&id)
            .map(|r| &r.key)
            .ok_or(RegistryError::UnknownHandle(id))
    }

    /// Id previously assigned to `key`, whether or not its record is live.
    pub fn id_of(&self, key: &SessionKey) -> Option<SurrogateId> {
        self.ids.get(key).copied()
    }

    pub fn get(&self, id: SurrogateId) -> Option<&SessionRecord> {
        self.records.get(&id)
    }

    /// Apply `event` to the record and return its new state.
    pub fn transition(&mut self, id: SurrogateId, event: LifecycleEvent) -> Result<SessionState> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(RegistryError::UnknownHandle(id))?;
        let from = record.state;
        let to = from
            .next(event)
            .ok_or(RegistryError::InvalidTransition {
                handle: id,
                from,
                event,
            })?;
        record.state = to;
        if from != to {
            debug!(handle = %id, %from, %to, %event, "session state changed");
        }
        Ok(to)
    }

    pub fn set_owner(&mut self, id: SurrogateId, owner: Option<LibraryId>) -> Result<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(RegistryError::UnknownHandle(id))?;
        record.owner = owner;
        Ok(())
    }

    /// Remove a terminated record. Its id stays bound to its key.
    pub fn evict(&mut self, id: SurrogateId) -> Result<SessionRecord> {
        let state = self
            .records
            .get(&id)
            .map(|r| r.state)
            .ok_or(RegistryError::UnknownHandle(id))?;
        if !state.is_terminal() {
            return Err(RegistryError::NotTerminated { handle: id, state });
        }
        let record = self
            .records
            .remove(&id)
            .ok_or(RegistryError::UnknownHandle(id))?;
        debug!(handle = %id, session = %record.key, "evicted session record");
        Ok(record)
    }

    /// Live records in ascending id order.
    pub fn list(&self) -> impl Iterator<Item = &SessionRecord> {
        self.records.values()
    }

    pub fn records_matching<F>(&self, mut pred: F) -> Vec<&SessionRecord>
    where
        F: FnMut(&SessionRecord) -> bool,
    {
        self.records.values().filter(|r| pred(r)).collect()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next_id - 1
    }
}
