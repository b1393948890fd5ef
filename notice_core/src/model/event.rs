//! # Classified Events
//!
//! The dispatch-ready representation of a notice. An [`EventDescription`] is
//! built once by the Notice API and is read-only afterwards; listeners receive
//! it by shared reference.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::notice::NoticeId;
use crate::model::topology::{Lid, NodeType};
use crate::traps::classifier::TrapKind;

/// How urgent an event is, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational.
    Info,
    /// Degraded but working.
    Warning,
    /// Something failed.
    Error,
    /// Needs attention now.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// # Event Category
///
/// The user-facing grouping of trap kinds. Every category has a built-in
/// default severity which a session may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventCategory {
    /// A port or GID came into service.
    PortActive,
    /// A port or GID went out of service.
    PortInactive,
    /// Link state, capability or system GUID change.
    TopologyChange,
    /// Link errors, overruns and width downgrades.
    LinkIntegrity,
    /// Bad M_Key, P_Key or Q_Key.
    SecurityViolation,
    /// Multicast group created or deleted.
    MulticastChange,
    /// Fabric executive connection dropped.
    FeConnectionLost,
    /// Fabric executive connection (re)established.
    FeConnectionEstablished,
    /// Subnet manager connection dropped.
    SmConnectionLost,
    /// Subnet manager connection (re)established.
    SmConnectionEstablished,
}

impl EventCategory {
    /// Every category, in declaration order.
    pub const ALL: [EventCategory; 10] = [
        EventCategory::PortActive,
        EventCategory::PortInactive,
        EventCategory::TopologyChange,
        EventCategory::LinkIntegrity,
        EventCategory::SecurityViolation,
        EventCategory::MulticastChange,
        EventCategory::FeConnectionLost,
        EventCategory::FeConnectionEstablished,
        EventCategory::SmConnectionLost,
        EventCategory::SmConnectionEstablished,
    ];

    /// Built-in severity before any override.
    pub fn default_severity(self) -> Severity {
        match self {
            EventCategory::PortActive
            | EventCategory::TopologyChange
            | EventCategory::MulticastChange
            | EventCategory::FeConnectionEstablished
            | EventCategory::SmConnectionEstablished => Severity::Info,
            EventCategory::PortInactive | EventCategory::LinkIntegrity => Severity::Warning,
            EventCategory::SecurityViolation => Severity::Error,
            EventCategory::FeConnectionLost | EventCategory::SmConnectionLost => Severity::Critical,
        }
    }
}

/// # Event Source
///
/// The entity an event is about. Only the attributes needed to identify the
/// entity are carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventSource {
    /// A node, addressed by LID.
    #[serde(rename_all = "camelCase")]
    Node {
        /// Base LID of the node.
        lid: Lid,
        /// Node description.
        description: String,
        /// Kind of node.
        node_type: NodeType,
    },
    /// One port of a node.
    #[serde(rename_all = "camelCase")]
    Port {
        /// Base LID of the owning node.
        lid: Lid,
        /// Description of the owning node.
        description: String,
        /// Kind of the owning node.
        node_type: NodeType,
        /// Port number on that node.
        port_num: u8,
    },
    /// The fabric executive endpoint the session talks to.
    #[serde(rename_all = "camelCase")]
    FabricEndpoint {
        /// Endpoint host name or address.
        host: String,
        /// Endpoint TCP port.
        port: u16,
    },
}

impl EventSource {
    /// The LID this source is addressed by, if it is a fabric entity.
    pub fn lid(&self) -> Option<Lid> {
        match self {
            EventSource::Node { lid, .. } | EventSource::Port { lid, .. } => Some(*lid),
            EventSource::FabricEndpoint { .. } => None,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::Node { lid, description, node_type } => {
                write!(f, "{} {} ({})", node_type, description, lid)
            }
            EventSource::Port { lid, description, node_type, port_num } => {
                write!(f, "{} {} ({}) port {}", node_type, description, lid, port_num)
            }
            EventSource::FabricEndpoint { host, port } => write!(f, "FE {}:{}", host, port),
        }
    }
}

/// # Event Description
///
/// A classified notice ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescription {
    /// Id of the originating notice.
    pub id: NoticeId,
    /// When the notice was received.
    pub timestamp: DateTime<Utc>,
    /// Classified trap kind.
    pub trap: TrapKind,
    /// Category of `trap`.
    pub category: EventCategory,
    /// Severity after overrides.
    pub severity: Severity,
    /// `None` when resolution failed; the event is still delivered.
    pub source: Option<EventSource>,
    /// Other nodes affected, e.g. the far end of a link.
    pub related: Vec<Lid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severities() {
        assert_eq!(EventCategory::LinkIntegrity.default_severity(), Severity::Warning);
        assert_eq!(EventCategory::SmConnectionLost.default_severity(), Severity::Critical);
        assert_eq!(EventCategory::PortActive.default_severity(), Severity::Info);
        assert!(Severity::Critical > Severity::Warning);
    }

    #[test]
    fn test_source_display_and_lid() {
        let port = EventSource::Port {
            lid: Lid(3),
            description: "edge01".into(),
            node_type: NodeType::Switch,
            port_num: 7,
        };
        assert_eq!(port.to_string(), "SW edge01 (0x0003) port 7");
        assert_eq!(port.lid(), Some(Lid(3)));

        let fe = EventSource::FabricEndpoint { host: "fm1".into(), port: 3245 };
        assert_eq!(fe.lid(), None);
        assert_eq!(fe.to_string(), "FE fm1:3245");
    }

    #[test]
    fn test_source_serializes_tagged() {
        let src = EventSource::Node { lid: Lid(1), description: "n".into(), node_type: NodeType::ChannelAdapter };
        let value = serde_json::to_value(&src).unwrap();
        assert_eq!(value["kind"], "node");
        assert_eq!(value["nodeType"], "channelAdapter");
    }
}
