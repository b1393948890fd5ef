//! # Test Fixtures
//!
//! A star fabric (one switch, `n` HFIs on ports `1..=n`), notice builders and
//! a listener that forwards delivered events to a channel.

use std::sync::Arc;
use std::time::Duration;

use notice_core::model::topology::{Guid, Lid, Link, Node, NodeType, Port, PortState};
use notice_core::traps::payload::encode;
use notice_core::{
    ContextResolver, DomainPipeline, DomainSnapshot, EventDescription, EventListener, ListenerError, MemoryFabric,
    MemoryPerformanceMonitor, Notice, NoticeApi, NoticeId, NoticeJob, NoticeJobSettings, NoticeRegistry,
    StlPayloadDecoder,
};
use tokio::sync::mpsc;

pub const DOMAIN: &str = "fabric0";
pub const SWITCH_LID: Lid = Lid(100);

pub fn hfi(lid: u32) -> Node {
    Node {
        lid: Lid(lid),
        port_guid: Guid(0x0011_7501_0000_0000 + u64::from(lid)),
        description: format!("node{:03} hfi1_0", lid),
        node_type: NodeType::ChannelAdapter,
        num_ports: 1,
    }
}

pub fn switch(lid: Lid, num_ports: u8) -> Node {
    Node {
        lid,
        port_guid: Guid(0x0011_7501_ff00_0000 + u64::from(lid.0)),
        description: "edge-sw01".to_string(),
        node_type: NodeType::Switch,
        num_ports,
    }
}

/// Switch `SWITCH_LID` with HFIs `1..=hfis`, HFI `i` on switch port `i`.
pub fn star_snapshot(hfis: u32) -> DomainSnapshot {
    let mut nodes = vec![switch(SWITCH_LID, hfis as u8)];
    let mut ports = Vec::new();
    let mut links = Vec::new();
    for lid in 1..=hfis {
        nodes.push(hfi(lid));
        ports.push(Port { lid: SWITCH_LID, port_num: lid as u8, state: PortState::Active });
        ports.push(Port { lid: Lid(lid), port_num: 1, state: PortState::Active });
        links.push(Link { from_lid: SWITCH_LID, from_port: lid as u8, to_lid: Lid(lid), to_port: 1 });
    }
    DomainSnapshot { nodes, ports, links, notices: Vec::new() }
}

pub fn star_fabric(hfis: u32) -> MemoryFabric {
    let fabric = MemoryFabric::new();
    fabric.add_domain(DOMAIN, star_snapshot(hfis));
    fabric
}

pub fn link_integrity(id: u64, lid: u32) -> Notice {
    Notice::received(id, Lid(lid), 129, encode::lid(Lid(lid), Some(1)))
}

pub fn port_change(id: u64, lid: Lid) -> Notice {
    Notice::received(id, lid, 128, encode::lid(lid, None))
}

/// A monitor whose zero-length sweep makes the convergence wait instant.
pub fn instant_monitor() -> Arc<MemoryPerformanceMonitor> {
    Arc::new(MemoryPerformanceMonitor::new(0))
}

pub fn job(fabric: &MemoryFabric, domain: &str, monitor: Arc<MemoryPerformanceMonitor>) -> NoticeJob {
    let cache = Arc::new(fabric.live_cache(domain));
    NoticeJob::new(
        domain,
        Arc::new(fabric.clone()),
        cache.clone(),
        monitor,
        Arc::new(StlPayloadDecoder),
        NoticeJobSettings::default(),
    )
    .with_cache_updater(cache)
}

pub fn registry(fabric: &MemoryFabric) -> NoticeRegistry {
    let fabric = fabric.clone();
    NoticeRegistry::new(move |domain| {
        let resolver = ContextResolver::new(
            domain,
            Arc::new(fabric.live_cache(domain)),
            Arc::new(fabric.clone()),
            Arc::new(StlPayloadDecoder),
        );
        DomainPipeline::new(NoticeApi::new(resolver, None), job(&fabric, domain, instant_monitor()))
    })
}

/// Forwards every delivered event to a channel.
pub struct ChannelListener(mpsc::UnboundedSender<EventDescription>);

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<EventDescription>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

impl EventListener for ChannelListener {
    fn on_new_events(&self, events: &[EventDescription]) -> Result<(), ListenerError> {
        for event in events {
            self.0
                .send(event.clone())
                .map_err(|_| ListenerError::new("test receiver dropped"))?;
        }
        Ok(())
    }
}

/// Receives exactly `n` events, failing after five seconds of silence.
pub async fn recv_events(rx: &mut mpsc::UnboundedReceiver<EventDescription>, n: usize) -> Vec<EventDescription> {
    let mut events = Vec::with_capacity(n);
    while events.len() < n {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => panic!("listener channel closed after {} events", events.len()),
            Err(_) => panic!("timed out after {} of {} events", events.len(), n),
        }
    }
    events
}

pub fn ids(events: &[EventDescription]) -> Vec<NoticeId> {
    events.iter().map(|e| e.id).collect()
}
