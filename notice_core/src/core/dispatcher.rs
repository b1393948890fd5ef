//! # Event Dispatcher
//!
//! Single-consumer delivery of [`EventDescription`]s to any number of
//! listeners.
//!
//! ## Design
//!
//! 1.  **Append and signal**: producers only push onto the pending queue and
//!     signal a [`Notify`]. A signal sent while the consumer is busy is kept
//!     as a permit, so an event enqueued between "queue looked empty" and
//!     "consumer suspended" is never stranded.
//!
//! 2.  **Whole-queue batches**: each wake drains the entire queue and hands
//!     it to every listener as one slice. Order is the enqueue order.
//!
//! 3.  **Copy-on-write listeners**: the listener set is an immutable vector
//!     behind an [`ArcSwap`]. Delivery iterates a snapshot, so listeners can
//!     be added or removed at any time, including from inside a callback.
//!
//! 4.  **Isolation**: a listener that returns an error or panics is logged
//!     and counted; the batch still reaches the others. Catching panics needs
//!     an unwinding build, so listeners report failures through
//!     [`ListenerError`] wherever they can.
//!
//! 5.  **Stop**: cancels the consumer's token (which also wakes it), drops
//!     every listener and clears the queue.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::model::event::EventDescription;

/// Failure reported by a listener. Counted, logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    /// A failure with a free-form message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives batches of events on the dispatcher's consumer task.
pub trait EventListener: Send + Sync {
    /// Handles one batch, in enqueue order. An `Err` does not stop delivery
    /// to the other listeners.
    fn on_new_events(&self, events: &[EventDescription]) -> Result<(), ListenerError>;
}

/// Handle returned by [`Dispatcher::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Counters since the dispatcher was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Batches handed to the listener set.
    pub batches: u64,
    /// Events in those batches, counted once per batch, not per listener.
    pub events_delivered: u64,
    /// Events discarded because the pending queue was full.
    pub events_dropped: u64,
    /// Listener calls that returned an error or panicked.
    pub listener_failures: u64,
}

type ListenerSet = Vec<(ListenerId, Arc<dyn EventListener>)>;

struct Shared {
    pending: Mutex<VecDeque<EventDescription>>,
    listeners: ArcSwap<ListenerSet>,
    wake: Notify,
    cancel: CancellationToken,
    max_pending: Option<usize>,
    next_listener: AtomicU64,
    batches: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
}

impl Shared {
    fn deliver(&self, batch: &[EventDescription]) {
        let listeners = self.listeners.load_full();
        for (id, listener) in listeners.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_new_events(batch))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(listener_id = id.0, events = batch.len(), error = %e, "listener failed during delivery");
                }
                Err(_) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(listener_id = id.0, events = batch.len(), "listener panicked during delivery");
                }
            }
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(batch.len() as u64, Ordering::Relaxed);
        debug!(events = batch.len(), listeners = listeners.len(), "batch delivered");
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let batch: Vec<EventDescription> = self.pending.lock().drain(..).collect();
            if !batch.is_empty() {
                self.deliver(&batch);
                continue;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => {}
            }
        }
        debug!("dispatcher consumer exited");
    }
}

/// # Dispatcher
///
/// Owns the pending queue, the listener set and the consumer task.
pub struct Dispatcher {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Creates a dispatcher that is not yet consuming. `max_pending` bounds
    /// the queue by dropping the oldest events; `None` leaves it unbounded.
    pub fn new(max_pending: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                listeners: ArcSwap::from_pointee(Vec::new()),
                wake: Notify::new(),
                cancel: CancellationToken::new(),
                max_pending,
                next_listener: AtomicU64::new(1),
                batches: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawns the consumer task on the current tokio runtime. Calling it
    /// again, or after [`Dispatcher::stop`], does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() || self.shared.cancel.is_cancelled() {
            return;
        }
        *task = Some(tokio::spawn(Arc::clone(&self.shared).run()));
        info!("dispatcher started");
    }

    /// True between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some() && !self.shared.cancel.is_cancelled()
    }

    /// Appends `events` and wakes the consumer. Empty input and a stopped
    /// dispatcher are no-ops.
    pub fn enqueue(&self, events: Vec<EventDescription>) {
        if events.is_empty() || self.shared.cancel.is_cancelled() {
            return;
        }
        let dropped = {
            let mut pending = self.shared.pending.lock();
            pending.extend(events);
            match self.shared.max_pending {
                Some(max) if pending.len() > max => {
                    let excess = pending.len() - max;
                    pending.drain(..excess);
                    excess
                }
                _ => 0,
            }
        };
        if dropped > 0 {
            self.shared.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            warn!(dropped, "pending event queue full, oldest events dropped");
        }
        self.shared.wake.notify_one();
    }

    /// Registers a listener. It sees every batch delivered after this call.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.rcu(|current| {
            let mut next = ListenerSet::clone(current);
            next.push((id, Arc::clone(&listener)));
            next
        });
        debug!(listener_id = id.0, "listener added");
        id
    }

    /// Returns whether a listener was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let previous = self.shared.listeners.rcu(|current| {
            current.iter().filter(|(lid, _)| *lid != id).cloned().collect::<ListenerSet>()
        });
        let removed = previous.iter().any(|(lid, _)| *lid == id);
        if removed {
            debug!(listener_id = id.0, "listener removed");
        }
        removed
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.load().len()
    }

    /// Events waiting for the consumer.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Current counters.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            batches: self.shared.batches.load(Ordering::Relaxed),
            events_delivered: self.shared.delivered.load(Ordering::Relaxed),
            events_dropped: self.shared.dropped.load(Ordering::Relaxed),
            listener_failures: self.shared.failures.load(Ordering::Relaxed),
        }
    }

    /// Stops the consumer, drops every listener and discards pending events.
    pub fn stop(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.cancel.cancel();
        self.shared.listeners.store(Arc::new(Vec::new()));
        let discarded = {
            let mut pending = self.shared.pending.lock();
            let n = pending.len();
            pending.clear();
            n
        };
        self.shared.wake.notify_one();
        info!(discarded, "dispatcher stopped");
    }

    /// Waits for the consumer task to exit. Returns at once if it was never
    /// started or has already been joined.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "dispatcher consumer ended abnormally");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
