use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    fixgate_sessions::{InterestPolicy, LibraryId, SessionKey, SessionRecord, SurrogateId},
    serde::Serialize,
    tokio::{
        sync::mpsc::{self, error::TrySendError},
        task::JoinHandle,
    },
    tracing::{debug, trace, warn},
};

use crate::{
    handler::{LibraryRef, SessionExistsHandler},
    ledger::DeliveryLedger,
};

// ── Existence event ──────────────────────────────────────────────────────────

/// A session identity that a library should be told about.
#[derive(Debug, Clone)]
pub struct ExistenceEvent {
    pub id: SurrogateId,
    pub epoch: u64,
    pub key: Arc<SessionKey>,
}

impl ExistenceEvent {
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            epoch: record.epoch,
            key: Arc::new(record.key.clone()),
        }
    }
}

// ── Delivery statistics ──────────────────────────────────────────────────────

/// Per-library delivery counters. Shared by the proxy, its worker and any
/// replay in flight; survives detach so faults can be inspected afterwards.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    faults: AtomicU64,
    dropped: AtomicU64,
    replays_aborted: AtomicU64,
    last_fault: Mutex<Option<String>>,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliverySnapshot {
    pub delivered: u64,
    pub faults: u64,
    pub dropped: u64,
    pub replays_aborted: u64,
    pub last_fault: Option<String>,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            replays_aborted: self.replays_aborted.load(Ordering::Relaxed),
            last_fault: self
                .last_fault
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    fn record_fault(&self, reason: String) {
        self.faults.fetch_add(1, Ordering::Relaxed);
        *self.last_fault.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
    }

    pub(crate) fn record_replay_aborted(&self) {
        self.replays_aborted.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Delivery channel ─────────────────────────────────────────────────────────

/// Outcome of offering an event to a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// This library already has this record epoch, or a newer one.
    AlreadyDelivered,
    /// Queue full; the event was not queued and can be replayed later.
    Dropped,
    Closed,
}

/// Sending half of a library's queue, cheap to clone into replay tasks.
#[derive(Clone)]
pub struct DeliveryChannel {
    library: LibraryRef,
    sender: mpsc::Sender<ExistenceEvent>,
    ledger: Arc<DeliveryLedger>,
    stats: Arc<DeliveryStats>,
    closed: Arc<AtomicBool>,
    generation: u64,
}

impl DeliveryChannel {
    pub fn library(&self) -> &LibraryRef {
        &self.library
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Queue `event` without waiting. Used on the logon path.
    pub fn offer(&self, event: ExistenceEvent) -> Offer {
        if self.is_closed() {
            return Offer::Closed;
        }
        if !self.ledger.claim(event.id, event.epoch, self.generation) {
            return Offer::AlreadyDelivered;
        }
        let (id, epoch) = (event.id, event.epoch);
        match self.sender.try_send(event) {
            Ok(()) => {
                trace!(library = %self.library, handle = %id, "queued existence event");
                Offer::Queued
            },
            Err(TrySendError::Full(_)) => {
                self.ledger.release(id, epoch, self.generation);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(library = %self.library, handle = %id, "library queue full, existence event dropped");
                Offer::Dropped
            },
            Err(TrySendError::Closed(_)) => {
                self.ledger.release(id, epoch, self.generation);
                Offer::Closed
            },
        }
    }

    /// Queue `event`, waiting for queue space. Used by attach replays.
    ///
    /// Cancel-safe: the ledger claim is only taken once a slot is reserved.
    pub async fn send(&self, event: ExistenceEvent) -> Offer {
        if self.is_closed() {
            return Offer::Closed;
        }
        let Ok(permit) = self.sender.reserve().await else {
            return Offer::Closed;
        };
        if self.closed.load(Ordering::Acquire) {
            return Offer::Closed;
        }
        if !self.ledger.claim(event.id, event.epoch, self.generation) {
            return Offer::AlreadyDelivered;
        }
        permit.send(event);
        Offer::Queued
    }
}

// ── Library proxy ────────────────────────────────────────────────────────────

/// Gateway-side stand-in for one attached library.
///
/// Owns a bounded FIFO queue drained by a dedicated blocking worker that
/// invokes the library's handler, so a slow or failing handler only holds
/// up its own library.
pub struct LibraryProxy {
    channel: DeliveryChannel,
    interest: InterestPolicy,
    worker: Option<JoinHandle<()>>,
}

impl LibraryProxy {
    /// Start the proxy's worker. Must be called within a tokio runtime.
    pub fn spawn(
        library: LibraryRef,
        interest: InterestPolicy,
        handler: Arc<dyn SessionExistsHandler>,
        ledger: Arc<DeliveryLedger>,
        stats: Arc<DeliveryStats>,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let generation = ledger.next_generation();
        let channel = DeliveryChannel {
            library: library.clone(),
            sender,
            ledger: Arc::clone(&ledger),
            stats: Arc::clone(&stats),
            closed: Arc::clone(&closed),
            generation,
        };

        let worker = tokio::task::spawn_blocking(move || {
            run_worker(library, receiver, handler, ledger, stats, closed, generation)
        });

        Self {
            channel,
            interest,
            worker: Some(worker),
        }
    }

    pub fn id(&self) -> LibraryId {
        self.channel.library.id
    }

    pub fn library(&self) -> &LibraryRef {
        &self.channel.library
    }

    pub fn interest(&self) -> InterestPolicy {
        self.interest
    }

    pub fn channel(&self) -> DeliveryChannel {
        self.channel.clone()
    }

    pub fn wants(&self, record: &SessionRecord) -> bool {
        self.interest.matches(self.id(), record)
    }

    pub fn offer(&self, event: ExistenceEvent) -> Offer {
        self.channel.offer(event)
    }

    /// Stop delivering. Events still queued are discarded and their ledger
    /// claims released. Returns the worker handle so callers can wait for it.
    pub fn close(mut self) -> Option<JoinHandle<()>> {
        self.channel.closed.store(true, Ordering::Release);
        self.worker.take()
    }

    /// Stop accepting events but let the worker deliver what is queued.
    pub fn finish(mut self) -> Option<JoinHandle<()>> {
        self.worker.take()
    }
}

fn run_worker(
    library: LibraryRef,
    mut receiver: mpsc::Receiver<ExistenceEvent>,
    handler: Arc<dyn SessionExistsHandler>,
    ledger: Arc<DeliveryLedger>,
    stats: Arc<DeliveryStats>,
    closed: Arc<AtomicBool>,
    generation: u64,
) {
    debug!(library = %library, generation, "delivery worker started");
    while let Some(event) = receiver.blocking_recv() {
        if closed.load(Ordering::Acquire) {
            receiver.close();
            ledger.release(event.id, event.epoch, generation);
            continue;
        }
        if !ledger.begin_delivery(event.id, event.epoch, generation) {
            trace!(library = %library, handle = %event.id, "claim moved on, skipping event");
            continue;
        }

        let [lc, ls, ll, rc, rs, rl] = event.key.fields();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler.on_session_exists(&library, event.id, lc, ls, ll, rc, rs, rl)
        }));
        match outcome {
            Ok(Ok(())) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            },
            Ok(Err(e)) => {
                warn!(library = %library, handle = %event.id, error = %e, "session exists handler failed");
                stats.record_fault(e.to_string());
            },
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(library = %library, handle = %event.id, %reason, "session exists handler panicked");
                stats.record_fault(reason);
            },
        }
    }
    debug!(library = %library, "delivery worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
