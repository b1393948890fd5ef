//! # Context Resolver
//!
//! Decides which entity a notice is about and which other nodes it touches.
//! Lookups go to the live [`TopologyCache`] first and fall back to the
//! persisted [`NoticeStore`]. Only the payload fields a trap kind needs are
//! decoded.
//!
//! | trap kinds                                  | decoded field        | resolved by         |
//! |---------------------------------------------|----------------------|---------------------|
//! | GID now in service / out of service         | GID                  | port GUID           |
//! | port change, capability, bad keys, integrity| LID (+ port)         | LID                 |
//! | switch bad pkey, changed sys image guid     | sub-record           | LID in sub-record   |
//! | SM connection lost / established            | nothing              | issuing node        |
//! | FE connection lost / established            | nothing              | configured endpoint |
//! | anything else                               | nothing              | LID 0 (fabric-wide) |

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connections::notice_store::{NodeAddress, NoticeStore, StoreError};
use crate::connections::topology_cache::TopologyCache;
use crate::model::event::EventSource;
use crate::model::notice::Notice;
use crate::model::topology::{Lid, Link, Node, NodeType, Port};
use crate::traps::classifier::TrapKind;
use crate::traps::payload::{DecodeError, TrapPayloadDecoder};

/// Why a notice could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The addressed node is in neither the live cache nor the store.
    #[error("no node found for {0} in live cache or store")]
    ContextNotFound(NodeAddress),

    /// An FE connection trap arrived but no endpoint is configured.
    #[error("no fabric endpoint configured for FE connection traps")]
    NoFabricEndpoint,

    /// The payload is too short for the trap kind.
    #[error("payload decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The store failed while reading topology.
    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// The fabric executive endpoint the session is connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricEndpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// What a notice resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContext {
    /// The entity the event is about.
    pub source: EventSource,
    /// The node whose caches must be updated. `None` for endpoint and
    /// fabric-wide sources.
    pub node: Option<Node>,
    /// Neighbouring nodes touched by the notice, ascending, without the node itself.
    pub related: Vec<Lid>,
}

/// # Context Resolver
///
/// Turns a classified notice into its source, the node to update and the
/// related nodes. Reads the live cache first and the store second.
pub struct ContextResolver {
    domain: String,
    cache: Arc<dyn TopologyCache>,
    store: Arc<dyn NoticeStore>,
    decoder: Arc<dyn TrapPayloadDecoder>,
    endpoint: Option<FabricEndpoint>,
}

impl ContextResolver {
    /// A resolver for `domain` without a fabric endpoint.
    pub fn new(
        domain: impl Into<String>,
        cache: Arc<dyn TopologyCache>,
        store: Arc<dyn NoticeStore>,
        decoder: Arc<dyn TrapPayloadDecoder>,
    ) -> Self {
        Self {
            domain: domain.into(),
            cache,
            store,
            decoder,
            endpoint: None,
        }
    }

    /// Sets the endpoint used as the source of FE connection traps.
    #[must_use]
    pub fn with_fabric_endpoint(mut self, endpoint: FabricEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// The domain this resolver reads.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resolves `notice`, already classified as `kind`.
    pub fn resolve(&self, kind: TrapKind, notice: &Notice) -> Result<ResolvedContext, ContextError> {
        let payload = notice.payload.as_slice();
        match kind {
            TrapKind::GidNowInService => {
                let gid = self.decoder.decode_gid(payload)?;
                let node = self.lookup(NodeAddress::PortGuid(gid.interface_id))?;
                let related = neighbours(node.lid, &self.cache.get_links(node.lid));
                Ok(node_context(node, None, related))
            }
            TrapKind::GidOutOfService => {
                let gid = self.decoder.decode_gid(payload)?;
                let node = self.lookup(NodeAddress::PortGuid(gid.interface_id))?;
                let related = self
                    .first_stored_link(&node)?
                    .map(|link| vec![link.to_lid])
                    .unwrap_or_default();
                Ok(node_context(node, None, related))
            }
            TrapKind::LinkPortChangeState => {
                let lid = self.decoder.decode_lid(payload)?;
                let node = self.lookup(NodeAddress::Lid(lid))?;
                let mut links = self.cache.get_links(lid);
                links.extend(self.stored_links(&node)?);
                let related = neighbours(lid, &links);
                Ok(node_context(node, self.decoder.decode_port(payload), related))
            }
            TrapKind::LinkIntegrity
            | TrapKind::BufferOverrun
            | TrapKind::FlowWatchdog
            | TrapKind::LinkWidthDowngrade
            | TrapKind::ChangeCapability
            | TrapKind::BadMKey
            | TrapKind::BadPKey
            | TrapKind::BadQKey => {
                let lid = self.decoder.decode_lid(payload)?;
                let node = self.lookup(NodeAddress::Lid(lid))?;
                let port = self.decoder.decode_port(payload);
                let related = match port {
                    Some(port) => self.far_end(lid, port)?.into_iter().collect(),
                    None => Vec::new(),
                };
                Ok(node_context(node, port, related))
            }
            TrapKind::SwitchBadPKey => {
                let record = self.decoder.decode_switch_pkey(payload)?;
                let node = self.lookup(NodeAddress::Lid(record.lid1))?;
                let related = if record.lid2.is_fabric() || record.lid2 == node.lid {
                    Vec::new()
                } else {
                    vec![record.lid2]
                };
                Ok(node_context(node, Some(record.port), related))
            }
            TrapKind::ChangeSysGuid => {
                let change = self.decoder.decode_sys_guid_change(payload)?;
                let node = self.lookup(NodeAddress::Lid(change.lid))?;
                Ok(node_context(node, None, Vec::new()))
            }
            TrapKind::SmConnectionLost | TrapKind::SmConnectionEstablish => {
                let node = self.lookup(NodeAddress::Lid(notice.issuer_lid))?;
                Ok(node_context(node, None, Vec::new()))
            }
            TrapKind::FeConnectionLost | TrapKind::FeConnectionEstablish => {
                let endpoint = self.endpoint.as_ref().ok_or(ContextError::NoFabricEndpoint)?;
                Ok(ResolvedContext {
                    source: EventSource::FabricEndpoint {
                        host: endpoint.host.clone(),
                        port: endpoint.port,
                    },
                    node: None,
                    related: Vec::new(),
                })
            }
            TrapKind::AddMulticastGroup | TrapKind::DelMulticastGroup | TrapKind::Unsupported(_) => {
                Ok(self.fabric_wide())
            }
        }
    }

    /// Live cache first, persisted store second.
    pub fn lookup(&self, address: NodeAddress) -> Result<Node, ContextError> {
        if let Some(node) = self.cache.get_node(address) {
            return Ok(node);
        }
        self.store
            .get_node(&self.domain, address)?
            .ok_or(ContextError::ContextNotFound(address))
    }

    /// Current ports and links of `lid` from the live cache.
    pub fn snapshot(&self, lid: Lid) -> (Vec<Port>, Vec<Link>) {
        (self.cache.get_ports(lid), self.cache.get_links(lid))
    }

    fn fabric_wide(&self) -> ResolvedContext {
        let address = NodeAddress::Lid(Lid::FABRIC);
        let node = self
            .cache
            .get_node(address)
            .or_else(|| self.store.get_node(&self.domain, address).ok().flatten());
        let source = match &node {
            Some(node) => node_source(node, None),
            None => EventSource::Node {
                lid: Lid::FABRIC,
                description: "fabric".to_string(),
                node_type: NodeType::Unknown,
            },
        };
        // A fabric-wide event never drives a cache update.
        ResolvedContext { source, node: None, related: Vec::new() }
    }

    fn first_stored_link(&self, node: &Node) -> Result<Option<Link>, ContextError> {
        for port in 1..=node.num_ports.max(1) {
            if let Some(link) = self.store.link_by_source(&self.domain, node.lid, port)? {
                return Ok(Some(link));
            }
        }
        Ok(None)
    }

    fn stored_links(&self, node: &Node) -> Result<Vec<Link>, ContextError> {
        let mut links = Vec::new();
        for port in 1..=node.num_ports.max(1) {
            if let Some(link) = self.store.link_by_source(&self.domain, node.lid, port)? {
                links.push(link);
            }
        }
        Ok(links)
    }

    fn far_end(&self, lid: Lid, port: u8) -> Result<Option<Lid>, ContextError> {
        let live = self
            .cache
            .get_links(lid)
            .into_iter()
            .find(|l| l.from_port == port)
            .map(|l| l.to_lid);
        if live.is_some() {
            return Ok(live);
        }
        Ok(self.store.link_by_source(&self.domain, lid, port)?.map(|l| l.to_lid))
    }
}

fn node_source(node: &Node, port: Option<u8>) -> EventSource {
    match port {
        Some(port_num) => EventSource::Port {
            lid: node.lid,
            description: node.description.clone(),
            node_type: node.node_type,
            port_num,
        },
        None => EventSource::Node {
            lid: node.lid,
            description: node.description.clone(),
            node_type: node.node_type,
        },
    }
}

fn node_context(node: Node, port: Option<u8>, related: Vec<Lid>) -> ResolvedContext {
    ResolvedContext {
        source: node_source(&node, port),
        node: Some(node),
        related,
    }
}

fn neighbours(lid: Lid, links: &[Link]) -> Vec<Lid> {
    links
        .iter()
        .map(|l| if l.from_lid == lid { l.to_lid } else { l.from_lid })
        .filter(|other| *other != lid)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
