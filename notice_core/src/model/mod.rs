//! # Data Model
//!
//! Plain data carried through the pipeline:
//!
//! - **`topology`**: fabric addressing (`Lid`, `Gid`) and the node/port/link
//!   records served by the topology collaborators.
//! - **`notice`**: the persisted raw trap record, its forward-only status and
//!   the per-cycle `NoticeProcess` working record.
//! - **`event`**: the classified, dispatch-ready `EventDescription`.

/// Fabric addressing and topology records.
pub mod topology;
/// Raw notices, their status and per-cycle working records.
pub mod notice;
/// Classified events delivered to listeners.
pub mod event;

pub use event::{EventCategory, EventDescription, EventSource, Severity};
pub use notice::{Notice, NoticeId, NoticeProcess, NoticeStatus, ProcessingOutcome};
pub use topology::{Gid, Guid, Lid, Link, Node, NodeType, Port, PortState};
