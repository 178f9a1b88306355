use std::sync::atomic::{AtomicU64, Ordering};

use {dashmap::DashMap, fixgate_sessions::SurrogateId};

/// Where one record epoch stands for a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// Sitting in the queue of the proxy attached as `generation`.
    Queued { generation: u64 },
    /// Handed to the library's handler.
    Delivered,
    /// Never handed over; free for the next offer to take.
    Vacant,
    /// The record is gone. Nothing at or below this epoch may be claimed.
    Retired,
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    epoch: u64,
    mark: Mark,
}

/// Existence events a library has been handed, one entry per surrogate id.
///
/// One ledger per library id, kept across detach and reattach. Each attach
/// takes a new generation. A claim is taken before an event is queued and
/// given back if the event is never handed to the handler. Claims still
/// queued on a closed proxy are taken over by the next generation. Only the
/// newest epoch of an id can be claimed, so a late replay of an older epoch
/// is refused.
#[derive(Debug, Default)]
pub struct DeliveryLedger {
    claims: DashMap<SurrogateId, Claim>,
    generation: AtomicU64,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attach generation. Generations only grow.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Take the claim for `(id, epoch)` on behalf of `generation`. Returns
    /// false if it is delivered, queued for this or a newer generation, or
    /// superseded by a newer epoch.
    pub fn claim(&self, id: SurrogateId, epoch: u64, generation: u64) -> bool {
        let queued = Claim {
            epoch,
            mark: Mark::Queued { generation },
        };
        let mut entry = self.claims.entry(id).or_insert(Claim {
            epoch,
            mark: Mark::Vacant,
        });
        let current = *entry;
        let granted = if epoch != current.epoch {
            epoch > current.epoch
        } else {
            match current.mark {
                Mark::Vacant => true,
                Mark::Queued { generation: held } => held < generation,
                Mark::Delivered | Mark::Retired => false,
            }
        };
        if granted {
            *entry = queued;
        }
        granted
    }

    /// Give back a claim that `generation` never handed to the handler.
    pub fn release(&self, id: SurrogateId, epoch: u64, generation: u64) {
        if let Some(mut entry) = self.claims.get_mut(&id)
            && entry.epoch == epoch
            && entry.mark == (Mark::Queued { generation })
        {
            entry.mark = Mark::Vacant;
        }
    }

    /// Mark a queued claim as handed over. Returns false when the claim has
    /// moved on to another generation or epoch, in which case the event must
    /// not be delivered.
    pub fn begin_delivery(&self, id: SurrogateId, epoch: u64, generation: u64) -> bool {
        match self.claims.get_mut(&id) {
            Some(mut entry)
                if entry.epoch == epoch && entry.mark == (Mark::Queued { generation }) =>
            {
                entry.mark = Mark::Delivered;
                true
            },
            _ => false,
        }
    }

    /// Whether `(id, epoch)` is queued or delivered.
    pub fn contains(&self, id: SurrogateId, epoch: u64) -> bool {
        self.claims.get(&id).is_some_and(|c| {
            c.epoch == epoch && matches!(c.mark, Mark::Queued { .. } | Mark::Delivered)
        })
    }

    /// The record for `id` at `epoch` is gone; refuse that epoch and any
    /// older one from now on.
    pub fn forget(&self, id: SurrogateId, epoch: u64) {
        let mut entry = self.claims.entry(id).or_insert(Claim {
            epoch,
            mark: Mark::Retired,
        });
        if entry.epoch <= epoch {
            *entry = Claim {
                epoch,
                mark: Mark::Retired,
            };
        }
    }

    /// Number of epochs currently queued or delivered.
    pub fn len(&self) -> usize {
        self.claims
            .iter()
            .filter(|c| matches!(c.mark, Mark::Queued { .. } | Mark::Delivered))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
