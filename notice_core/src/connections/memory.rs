//! # In-Memory Collaborators
//!
//! [`MemoryFabric`] plays both the persisted store and, through
//! [`MemoryFabric::live_cache`], the live topology cache for any number of
//! domains. All state sits behind one lock, which is what makes the claim
//! atomic across concurrently running cycles.
//!
//! The live cache's [`CacheUpdater`] reads through to the persisted batches:
//! an update for a record the store has not accepted yet fails. The
//! processing job's submit-then-update ordering is what keeps this from
//! happening.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::connections::notice_store::{NodeAddress, NoticeStore, PersistHandle, StoreError};
use crate::connections::perf_monitor::{PerfError, PerformanceMonitor};
use crate::connections::topology_cache::{CacheError, CacheUpdater, TopologyCache};
use crate::model::notice::{Notice, NoticeId, NoticeProcess, NoticeStatus};
use crate::model::topology::{Lid, Link, Node, Port, PortState};
use crate::traps::classifier::TrapKind;

/// Seed data for one domain. Deserializable so fixtures can live in JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainSnapshot {
    /// Nodes, both stored and live.
    pub nodes: Vec<Node>,
    /// Live ports.
    pub ports: Vec<Port>,
    /// Links, both stored and live.
    pub links: Vec<Link>,
    /// Notices as delivered by the transport.
    pub notices: Vec<Notice>,
}

#[derive(Debug, Default)]
struct DomainState {
    notices: BTreeMap<NoticeId, Notice>,
    stored_nodes: HashMap<Lid, Node>,
    stored_links: Vec<Link>,
    persisted: Vec<NoticeProcess>,
    live_nodes: HashMap<Lid, Node>,
    live_ports: HashMap<Lid, Vec<Port>>,
    live_links: Vec<Link>,
    failing_lids: HashSet<Lid>,
}

/// Links touching `lid`, oriented so that `from_lid == lid`.
fn links_touching(links: &[Link], lid: Lid) -> Vec<Link> {
    links
        .iter()
        .filter_map(|link| {
            if link.from_lid == lid {
                Some(*link)
            } else if link.to_lid == lid {
                Some(link.reversed())
            } else {
                None
            }
        })
        .collect()
}

fn find_node(nodes: &HashMap<Lid, Node>, address: NodeAddress) -> Option<Node> {
    match address {
        NodeAddress::Lid(lid) => nodes.get(&lid).cloned(),
        NodeAddress::PortGuid(guid) => nodes.values().find(|n| n.port_guid == guid).cloned(),
    }
}

/// # Memory Fabric
///
/// Store, live cache and cache updater for any number of domains behind one
/// lock. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryFabric {
    domains: Arc<Mutex<HashMap<String, DomainState>>>,
}

impl MemoryFabric {
    /// An empty fabric with no domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a domain. Stored and live topology both start
    /// from the snapshot.
    pub fn add_domain(&self, domain: &str, snapshot: DomainSnapshot) {
        let mut state = DomainState::default();
        for node in snapshot.nodes {
            state.stored_nodes.insert(node.lid, node.clone());
            state.live_nodes.insert(node.lid, node);
        }
        for port in snapshot.ports {
            state.live_ports.entry(port.lid).or_default().push(port);
        }
        state.stored_links = snapshot.links.clone();
        state.live_links = snapshot.links;
        for notice in snapshot.notices {
            state.notices.insert(notice.id, notice);
        }
        self.domains.lock().insert(domain.to_string(), state);
    }

    /// Registered domain names, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut names: Vec<String> = self.domains.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stores a notice as delivered by the transport.
    pub fn insert_notice(&self, domain: &str, notice: Notice) -> Result<(), StoreError> {
        let mut domains = self.domains.lock();
        let state = domains
            .get_mut(domain)
            .ok_or_else(|| StoreError::UnknownDomain(domain.to_string()))?;
        state.notices.insert(notice.id, notice);
        Ok(())
    }

    /// One stored notice.
    pub fn notice(&self, domain: &str, id: NoticeId) -> Option<Notice> {
        self.domains.lock().get(domain)?.notices.get(&id).cloned()
    }

    /// Every stored notice of `domain`, in id order.
    pub fn notices(&self, domain: &str) -> Vec<Notice> {
        self.domains
            .lock()
            .get(domain)
            .map(|state| state.notices.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every record accepted by `submit_processing_batch`, in order.
    pub fn persisted_records(&self, domain: &str) -> Vec<NoticeProcess> {
        self.domains
            .lock()
            .get(domain)
            .map(|state| state.persisted.clone())
            .unwrap_or_default()
    }

    /// Makes every later cache update for `lid` fail.
    pub fn fail_updates_for(&self, domain: &str, lid: Lid) {
        if let Some(state) = self.domains.lock().get_mut(domain) {
            state.failing_lids.insert(lid);
        }
    }

    /// Drops a node from the live view only, as if it had just left the fabric.
    pub fn remove_live_node(&self, domain: &str, lid: Lid) {
        if let Some(state) = self.domains.lock().get_mut(domain) {
            state.live_nodes.remove(&lid);
            state.live_ports.remove(&lid);
            state.live_links.retain(|l| l.from_lid != lid && l.to_lid != lid);
        }
    }

    /// Adds a link to the live view only.
    pub fn add_live_link(&self, domain: &str, link: Link) {
        if let Some(state) = self.domains.lock().get_mut(domain) {
            state.live_links.push(link);
        }
    }

    /// The live topology cache of one domain.
    pub fn live_cache(&self, domain: &str) -> MemoryTopologyCache {
        MemoryTopologyCache {
            domains: Arc::clone(&self.domains),
            domain: domain.to_string(),
        }
    }
}

impl NoticeStore for MemoryFabric {
    fn claim_pending(&self, domain: &str) -> Result<Vec<Notice>, StoreError> {
        let mut domains = self.domains.lock();
        let state = domains
            .get_mut(domain)
            .ok_or_else(|| StoreError::UnknownDomain(domain.to_string()))?;
        let now = Utc::now();
        let claimed: Vec<Notice> = state
            .notices
            .values_mut()
            .filter(|n| n.status == NoticeStatus::Received)
            .map(|n| {
                n.status = NoticeStatus::Inflight;
                n.claimed_at = Some(now);
                n.clone()
            })
            .collect();
        Ok(claimed)
    }

    fn reclaim_stale(&self, domain: &str, older_than: Duration) -> Result<Vec<Notice>, StoreError> {
        let mut domains = self.domains.lock();
        let state = domains
            .get_mut(domain)
            .ok_or_else(|| StoreError::UnknownDomain(domain.to_string()))?;
        let now = Utc::now();
        let threshold = chrono::Duration::from_std(older_than)
            .map_err(|e| StoreError::Backend(format!("reclaim threshold out of range: {}", e)))?;
        let reclaimed: Vec<Notice> = state
            .notices
            .values_mut()
            .filter(|n| n.status == NoticeStatus::Inflight)
            .filter(|n| n.claimed_at.map_or(true, |at| now - at >= threshold))
            .map(|n| {
                n.claimed_at = Some(now);
                n.clone()
            })
            .collect();
        Ok(reclaimed)
    }

    fn set_status(&self, domain: &str, id: NoticeId, status: NoticeStatus) -> Result<(), StoreError> {
        let mut domains = self.domains.lock();
        let state = domains
            .get_mut(domain)
            .ok_or_else(|| StoreError::UnknownDomain(domain.to_string()))?;
        let notice = state.notices.get_mut(&id).ok_or(StoreError::NoticeNotFound(id))?;
        if !notice.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition { id, from: notice.status, to: status });
        }
        notice.status = status;
        Ok(())
    }

    fn get_node(&self, domain: &str, address: NodeAddress) -> Result<Option<Node>, StoreError> {
        let domains = self.domains.lock();
        let state = domains
            .get(domain)
            .ok_or_else(|| StoreError::UnknownDomain(domain.to_string()))?;
        Ok(find_node(&state.stored_nodes, address))
    }

    fn link_by_source(&self, domain: &str, lid: Lid, port: u8) -> Result<Option<Link>, StoreError> {
        let domains = self.domains.lock();
        let state = domains
            .get(domain)
            .ok_or_else(|| StoreError::UnknownDomain(domain.to_string()))?;
        Ok(links_touching(&state.stored_links, lid)
            .into_iter()
            .find(|l| l.from_port == port))
    }

    fn submit_processing_batch(&self, domain: &str, records: Vec<NoticeProcess>) -> PersistHandle {
        let mut domains = self.domains.lock();
        let Some(state) = domains.get_mut(domain) else {
            return PersistHandle::ready(Err(StoreError::UnknownDomain(domain.to_string())));
        };
        let written = records.len();
        for record in &records {
            state.stored_nodes.insert(record.node.lid, record.node.clone());
        }
        state.persisted.extend(records);
        PersistHandle::ready(Ok(written))
    }
}

/// Live view of one domain of a [`MemoryFabric`].
#[derive(Debug, Clone)]
pub struct MemoryTopologyCache {
    domains: Arc<Mutex<HashMap<String, DomainState>>>,
    domain: String,
}

impl TopologyCache for MemoryTopologyCache {
    fn get_node(&self, address: NodeAddress) -> Option<Node> {
        let domains = self.domains.lock();
        find_node(&domains.get(&self.domain)?.live_nodes, address)
    }

    fn get_links(&self, lid: Lid) -> Vec<Link> {
        self.domains
            .lock()
            .get(&self.domain)
            .map(|state| links_touching(&state.live_links, lid))
            .unwrap_or_default()
    }

    fn get_ports(&self, lid: Lid) -> Vec<Port> {
        self.domains
            .lock()
            .get(&self.domain)
            .and_then(|state| state.live_ports.get(&lid).cloned())
            .unwrap_or_default()
    }
}

impl CacheUpdater for MemoryTopologyCache {
    fn name(&self) -> &str {
        "topology"
    }

    fn apply(&self, domain: &str, record: &NoticeProcess) -> Result<(), CacheError> {
        let mut domains = self.domains.lock();
        let state = domains.get_mut(domain).ok_or_else(|| CacheError::ReadThrough {
            cache: self.name().to_string(),
            reason: format!("unknown domain '{}'", domain),
        })?;
        let lid = record.node.lid;

        if state.failing_lids.contains(&lid) {
            return Err(CacheError::Rejected {
                cache: self.name().to_string(),
                lid,
                reason: "update refused".to_string(),
            });
        }

        let submitted = state
            .persisted
            .iter()
            .any(|r| r.node.lid == lid && r.notice_id() == record.notice_id());
        if !submitted {
            return Err(CacheError::ReadThrough {
                cache: self.name().to_string(),
                reason: format!("no persisted record for lid {}", lid),
            });
        }

        match record.kind {
            TrapKind::GidOutOfService if record.notice.is_some() => {
                state.live_links.retain(|l| l.from_lid != lid && l.to_lid != lid);
                if let Some(ports) = state.live_ports.get_mut(&lid) {
                    for port in ports.iter_mut() {
                        port.state = PortState::Down;
                    }
                }
            }
            _ => {
                state.live_nodes.insert(lid, record.node.clone());
                if !record.ports.is_empty() {
                    state.live_ports.insert(lid, record.ports.clone());
                }
                state.live_links.retain(|l| l.from_lid != lid && l.to_lid != lid);
                state.live_links.extend(record.links.iter().copied());
            }
        }
        Ok(())
    }
}

/// # Memory Performance Monitor
///
/// Settable sweep interval and image number. With `advance_after(n)` the
/// image moves on by itself at the `n`-th poll, which is how tests observe a
/// converged wait.
#[derive(Debug, Default)]
pub struct MemoryPerformanceMonitor {
    sweep_secs: AtomicU32,
    image: AtomicU64,
    polls: AtomicU64,
    advance_at: AtomicU64,
    fail_at: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryPerformanceMonitor {
    /// A monitor with the given sweep interval and image 0.
    pub fn new(sweep_secs: u32) -> Self {
        let monitor = Self::default();
        monitor.sweep_secs.store(sweep_secs, Ordering::Relaxed);
        monitor
    }

    /// Changes the reported sweep interval.
    pub fn set_sweep_interval(&self, secs: u32) {
        self.sweep_secs.store(secs, Ordering::Relaxed);
    }

    /// Publishes a new image.
    pub fn bump_image(&self) {
        self.image.fetch_add(1, Ordering::Relaxed);
    }

    /// Bumps the image when the `n`-th image poll happens (1-based). `0` disables.
    pub fn advance_after(&self, n: u64) {
        self.advance_at.store(n, Ordering::Relaxed);
    }

    /// Makes only the `n`-th image poll (1-based) fail. `0` disables.
    pub fn fail_poll(&self, n: u64) {
        self.fail_at.store(n, Ordering::Relaxed);
    }

    /// Makes every call fail while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of `image_number` calls so far.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

impl PerformanceMonitor for MemoryPerformanceMonitor {
    fn sweep_interval_secs(&self) -> Result<u32, PerfError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(PerfError::Unavailable("monitor offline".to_string()));
        }
        Ok(self.sweep_secs.load(Ordering::Relaxed))
    }

    fn image_number(&self, _group: &str) -> Result<u64, PerfError> {
        let poll = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if self.unavailable.load(Ordering::Relaxed) || self.fail_at.load(Ordering::Relaxed) == poll {
            return Err(PerfError::Unavailable("monitor offline".to_string()));
        }
        if self.advance_at.load(Ordering::Relaxed) == poll {
            self.bump_image();
        }
        Ok(self.image.load(Ordering::Relaxed))
    }
}
