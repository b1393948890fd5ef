//! # Notices
//!
//! A [`Notice`] is the raw trap record written by the transport layer. Its
//! [`NoticeStatus`] only ever moves forward:
//!
//! ```text
//! Received -> Inflight -> Processed
//!                      -> FeError
//! ```
//!
//! The claim (`Received -> Inflight`) is performed atomically by the store and
//! is both the exclusivity mechanism between concurrent cycles and the crash
//! marker. The terminal write is made by the processing job.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::topology::{Lid, Link, Node, Port};
use crate::traps::classifier::TrapKind;

/// Store-assigned notice identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoticeId(pub u64);

impl fmt::Display for NoticeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a stored notice. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeStatus {
    /// Stored by the transport, not yet claimed.
    Received,
    /// Claimed by a processing cycle.
    Inflight,
    /// Processed successfully.
    Processed,
    /// Processing failed for this notice.
    #[serde(rename = "FEERROR")]
    FeError,
}

impl NoticeStatus {
    /// `Processed` and `FeError` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, NoticeStatus::Processed | NoticeStatus::FeError)
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(self, next: NoticeStatus) -> bool {
        matches!(
            (self, next),
            (NoticeStatus::Received, NoticeStatus::Inflight)
                | (NoticeStatus::Inflight, NoticeStatus::Processed)
                | (NoticeStatus::Inflight, NoticeStatus::FeError)
        )
    }
}

impl fmt::Display for NoticeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NoticeStatus::Received => "RECEIVED",
            NoticeStatus::Inflight => "INFLIGHT",
            NoticeStatus::Processed => "PROCESSED",
            NoticeStatus::FeError => "FEERROR",
        };
        f.write_str(label)
    }
}

/// # Notice
///
/// A persisted fault or state-change record as received from the fabric
/// manager. The payload is opaque here; it is only ever interpreted through a
/// [`crate::traps::payload::TrapPayloadDecoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    /// Store id.
    pub id: NoticeId,
    /// LID of the node that issued the trap.
    pub issuer_lid: Lid,
    /// When the transport stored it.
    pub received_at: DateTime<Utc>,
    /// Numeric trap code, see [`crate::traps::classifier::classify`].
    pub trap_number: u16,
    /// Raw trap data details.
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Current lifecycle status.
    pub status: NoticeStatus,
    /// When the notice was last claimed. Set by the store on claim.
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Notice {
    /// Builds a freshly received notice.
    pub fn received(id: u64, issuer_lid: Lid, trap_number: u16, payload: Vec<u8>) -> Self {
        Self {
            id: NoticeId(id),
            issuer_lid,
            received_at: Utc::now(),
            trap_number,
            payload,
            status: NoticeStatus::Received,
            claimed_at: None,
        }
    }
}

/// # Notice Process
///
/// The per-cycle working record for one node affected by a notice. Neighbour
/// expansion produces records with `notice == None`; their outcome never maps
/// onto a stored status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeProcess {
    /// The originating notice; `None` for neighbour records.
    pub notice: Option<Notice>,
    /// Trap kind of the originating notice.
    pub kind: TrapKind,
    /// The affected node.
    pub node: Node,
    /// Live ports of `node` at record time.
    pub ports: Vec<Port>,
    /// Live links of `node` at record time.
    pub links: Vec<Link>,
}

impl NoticeProcess {
    /// Id of the originating notice, if any.
    pub fn notice_id(&self) -> Option<NoticeId> {
        self.notice.as_ref().map(|n| n.id)
    }
}

/// Result of processing one notice within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingOutcome {
    /// Resolved and every cache updated.
    Processed,
    /// The notice could not be resolved against topology.
    ContextMissing,
    /// Resolved, but a cache update failed.
    UpdateFailed,
}

impl ProcessingOutcome {
    /// The status written back to the notice for this outcome.
    pub fn terminal_status(self) -> NoticeStatus {
        match self {
            ProcessingOutcome::Processed => NoticeStatus::Processed,
            ProcessingOutcome::ContextMissing | ProcessingOutcome::UpdateFailed => NoticeStatus::FeError,
        }
    }
}
