//! # Live Topology Cache
//!
//! The in-memory view of the fabric the resolver prefers over persisted
//! storage, and the [`CacheUpdater`] seam the processing job drives once the
//! durable write has been submitted.

use thiserror::Error;

use crate::connections::notice_store::NodeAddress;
use crate::model::notice::NoticeProcess;
use crate::model::topology::{Lid, Link, Node, Port};

/// Failure of one cache update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The cache refused the record.
    #[error("cache '{cache}' rejected update for lid {lid}: {reason}")]
    Rejected {
        /// Updater name.
        cache: String,
        /// Node of the refused record.
        lid: Lid,
        /// Why it was refused.
        reason: String,
    },

    /// The record was not visible in the store yet.
    #[error("cache '{cache}' could not read through to the store: {reason}")]
    ReadThrough {
        /// Updater name.
        cache: String,
        /// What was missing.
        reason: String,
    },
}

/// Read side of the live topology.
pub trait TopologyCache: Send + Sync {
    /// Live node lookup.
    fn get_node(&self, address: NodeAddress) -> Option<Node>;

    /// Live links of `lid`, oriented so `from_lid == lid`.
    fn get_links(&self, lid: Lid) -> Vec<Link>;

    /// Live ports of `lid`.
    fn get_ports(&self, lid: Lid) -> Vec<Port>;
}

/// A derived cache kept in step with processed notices.
pub trait CacheUpdater: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Applies one working record. Runs after the record was submitted for persistence.
    fn apply(&self, domain: &str, record: &NoticeProcess) -> Result<(), CacheError>;
}
