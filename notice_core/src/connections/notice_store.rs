//! # Persisted Notice Store
//!
//! The durable side of the pipeline. Implementations must make
//! [`NoticeStore::claim_pending`] atomic: every `Received` notice of a domain
//! is flipped to `Inflight` and returned to exactly one caller, even when
//! several processing cycles run at once.
//!
//! [`NoticeStore::submit_processing_batch`] must have accepted the batch (so
//! that later reads observe it) by the time it returns; only the completion
//! is reported asynchronously through the [`PersistHandle`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::model::notice::{Notice, NoticeId, NoticeProcess, NoticeStatus};
use crate::model::topology::{Guid, Lid, Link, Node};

/// Failure of a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The domain has no stored topology.
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    /// No notice with this id in the domain.
    #[error("notice {0} not found")]
    NoticeNotFound(NoticeId),

    /// A status write that would move the notice backwards or sideways.
    #[error("notice {id}: illegal status transition {from} -> {to}")]
    IllegalTransition {
        /// The notice.
        id: NoticeId,
        /// Its stored status.
        from: NoticeStatus,
        /// The status that was refused.
        to: NoticeStatus,
    },

    /// The writer went away without completing the handle.
    #[error("durable write was dropped before completion")]
    PersistAborted,

    /// Anything the backend itself reported.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// How a node is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeAddress {
    /// By base LID.
    Lid(Lid),
    /// By port GUID.
    PortGuid(Guid),
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeAddress::Lid(lid) => write!(f, "lid {}", lid),
            NodeAddress::PortGuid(guid) => write!(f, "guid {}", guid),
        }
    }
}

/// # Notice Store
///
/// Persisted notices and the stored topology, per domain.
pub trait NoticeStore: Send + Sync {
    /// Atomically moves every `Received` notice of `domain` to `Inflight` and
    /// returns them. Fails with [`StoreError::UnknownDomain`] if the domain
    /// has no topology to claim against.
    fn claim_pending(&self, domain: &str) -> Result<Vec<Notice>, StoreError>;

    /// Atomically re-stamps and returns notices that have been `Inflight`
    /// for longer than `older_than`. Status is left unchanged.
    fn reclaim_stale(&self, domain: &str, older_than: Duration) -> Result<Vec<Notice>, StoreError>;

    /// Writes a status. Only forward transitions are accepted.
    fn set_status(&self, domain: &str, id: NoticeId, status: NoticeStatus) -> Result<(), StoreError>;

    /// Stored node lookup.
    fn get_node(&self, domain: &str, address: NodeAddress) -> Result<Option<Node>, StoreError>;

    /// The stored link leaving `lid` on `port`, if any.
    fn link_by_source(&self, domain: &str, lid: Lid, port: u8) -> Result<Option<Link>, StoreError>;

    /// Hands the cycle's working records to the durable writer.
    fn submit_processing_batch(&self, domain: &str, records: Vec<NoticeProcess>) -> PersistHandle;
}

/// # Persist Handle
///
/// Completion signal of a durable write. Resolves to the number of records
/// written.
#[derive(Debug)]
pub struct PersistHandle {
    rx: oneshot::Receiver<Result<usize, StoreError>>,
}

/// The writer's half of a [`PersistHandle`].
#[derive(Debug)]
pub struct PersistCompleter {
    tx: oneshot::Sender<Result<usize, StoreError>>,
}

impl PersistHandle {
    /// A connected writer/handle pair.
    pub fn channel() -> (PersistCompleter, PersistHandle) {
        let (tx, rx) = oneshot::channel();
        (PersistCompleter { tx }, PersistHandle { rx })
    }

    /// A handle that is already resolved.
    pub fn ready(result: Result<usize, StoreError>) -> PersistHandle {
        let (completer, handle) = PersistHandle::channel();
        completer.complete(result);
        handle
    }

    /// Waits for the durable write to finish.
    pub async fn wait(self) -> Result<usize, StoreError> {
        self.rx.await.unwrap_or(Err(StoreError::PersistAborted))
    }
}

impl PersistCompleter {
    /// Resolves the paired handle.
    pub fn complete(self, result: Result<usize, StoreError>) {
        // The caller may have dropped the handle; nobody is waiting then.
        let _ = self.tx.send(result);
    }
}
