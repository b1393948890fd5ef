//! # Fabric Topology Records
//!
//! Addressing primitives and the node, port and link snapshots returned by the
//! live topology cache and the persisted store. These are deliberately thin:
//! the pipeline only needs enough to identify an entity and its neighbours.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A local identifier assigned to a port by the subnet manager.
///
/// LID `0` is never assigned to a real port; the pipeline uses it as the
/// fabric-wide source for traps that do not name an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lid(pub u32);

impl Lid {
    /// The fabric-wide sentinel.
    pub const FABRIC: Lid = Lid(0);

    /// Whether this is the fabric-wide sentinel.
    pub fn is_fabric(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Lid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// A 64-bit globally unique identifier (port or system image GUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(pub u64);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// A global identifier: subnet prefix plus the port's interface id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gid {
    /// Upper 64 bits of the GID.
    pub subnet_prefix: u64,
    /// Port GUID of the addressed port.
    pub interface_id: Guid,
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}:{:016x}", self.subnet_prefix, self.interface_id.0)
    }
}

/// Kind of fabric node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// Host fabric interface.
    ChannelAdapter,
    /// Switch; port 0 is its management port.
    Switch,
    /// Router between subnets.
    Router,
    /// Anything the topology source could not type.
    Unknown,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeType::ChannelAdapter => "HFI",
            NodeType::Switch => "SW",
            NodeType::Router => "RT",
            NodeType::Unknown => "?",
        };
        f.write_str(label)
    }
}

/// A node as known to the topology cache or the persisted store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Base LID of the node.
    pub lid: Lid,
    /// Port GUID of the node's addressable port.
    pub port_guid: Guid,
    /// Node description string as reported by the node.
    pub description: String,
    /// Kind of node.
    pub node_type: NodeType,
    /// Number of external ports.
    pub num_ports: u8,
}

/// Logical port state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortState {
    /// Link down.
    Down,
    /// Link up, not yet configured by the subnet manager.
    Init,
    /// Configured, waiting to go active.
    Armed,
    /// Passing traffic.
    Active,
}

/// A port snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Owning node.
    pub lid: Lid,
    /// Port number on the node.
    pub port_num: u8,
    /// Current logical state.
    pub state: PortState,
}

/// A directed link between two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// Node on this end.
    pub from_lid: Lid,
    /// Port on this end.
    pub from_port: u8,
    /// Node on the far end.
    pub to_lid: Lid,
    /// Port on the far end.
    pub to_port: u8,
}

impl Link {
    /// The same link seen from the other end.
    pub fn reversed(&self) -> Link {
        Link {
            from_lid: self.to_lid,
            from_port: self.to_port,
            to_lid: self.from_lid,
            to_port: self.from_port,
        }
    }
}
