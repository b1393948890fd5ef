//! # Notice Processing Job
//!
//! One externally triggered cycle over a single fabric domain:
//!
//! 1. claim every `Received` notice (plus stale `Inflight` ones when re-claim
//!    is enabled); an empty claim ends the cycle,
//! 2. wait, bounded, for the performance subsystem to converge,
//! 3. classify and resolve each notice; a resolution failure marks only that
//!    notice,
//! 4. expand neighbour-impacting kinds into one extra record per neighbour,
//! 5. submit every record as one durable write without waiting for it,
//! 6. only then update the derived caches, record by record,
//! 7. write the terminal status of every notice and hand back the write's
//!    completion handle. Only notices whose `Processed` status was actually
//!    written are forwarded for dispatch.
//!
//! Only a failed claim aborts the cycle. Everything after it is isolated per
//! notice or per record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::connections::notice_store::{NodeAddress, NoticeStore, PersistHandle, StoreError};
use crate::connections::perf_monitor::PerformanceMonitor;
use crate::connections::topology_cache::{CacheUpdater, TopologyCache};
use crate::ingestors::context_resolver::{ContextResolver, FabricEndpoint};
use crate::ingestors::convergence::{wait_for_convergence, ConvergenceOutcome, ConvergenceSettings};
use crate::model::notice::{Notice, NoticeId, NoticeProcess, NoticeStatus, ProcessingOutcome};
use crate::traps::classifier::classify;
use crate::traps::payload::TrapPayloadDecoder;

/// Failure that aborts a whole cycle.
#[derive(Debug, Error)]
pub enum NoticeJobError {
    /// The store could not claim. No status was changed.
    #[error("claim failed for domain '{domain}': {source}")]
    ClaimFailed {
        /// Domain of the failed claim.
        domain: String,
        /// What the store reported.
        source: StoreError,
    },
}

/// Per-job knobs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NoticeJobSettings {
    /// Convergence wait after a non-empty claim.
    pub convergence: ConvergenceSettings,
    /// Re-claim notices stuck in `Inflight` for longer than this. `None`
    /// disables re-claim.
    pub inflight_reclaim: Option<Duration>,
}

/// # Cycle Report
///
/// What one cycle did. `persist` is the durable write's completion handle;
/// it is `None` when nothing was claimed.
#[derive(Debug)]
pub struct CycleReport {
    /// Domain the cycle ran on.
    pub domain: String,
    /// Notices claimed, re-claimed ones included.
    pub claimed: usize,
    /// How the convergence wait ended; `None` for an empty claim.
    pub convergence: Option<ConvergenceOutcome>,
    /// Outcome per claimed notice, in claim order.
    pub outcomes: Vec<(NoticeId, ProcessingOutcome)>,
    /// Notices that ended `Processed`, ready for classification and dispatch.
    pub processed_notices: Vec<Notice>,
    /// Completion of the durable write.
    pub persist: Option<PersistHandle>,
}

impl CycleReport {
    fn empty(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            claimed: 0,
            convergence: None,
            outcomes: Vec::new(),
            processed_notices: Vec::new(),
            persist: None,
        }
    }

    /// True when nothing was claimed.
    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }

    /// Outcome of one notice, if this cycle claimed it.
    pub fn outcome(&self, id: NoticeId) -> Option<ProcessingOutcome> {
        self.outcomes.iter().find(|(n, _)| *n == id).map(|(_, o)| *o)
    }

    /// How many notices ended with `outcome`.
    pub fn count(&self, outcome: ProcessingOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

/// # Notice Job
///
/// Runs processing cycles for one domain. Several jobs may share a domain;
/// the store's atomic claim keeps their work disjoint.
pub struct NoticeJob {
    domain: String,
    store: Arc<dyn NoticeStore>,
    monitor: Arc<dyn PerformanceMonitor>,
    resolver: ContextResolver,
    updaters: Vec<Arc<dyn CacheUpdater>>,
    settings: NoticeJobSettings,
}

impl NoticeJob {
    /// A job with no cache updaters yet.
    pub fn new(
        domain: impl Into<String>,
        store: Arc<dyn NoticeStore>,
        cache: Arc<dyn TopologyCache>,
        monitor: Arc<dyn PerformanceMonitor>,
        decoder: Arc<dyn TrapPayloadDecoder>,
        settings: NoticeJobSettings,
    ) -> Self {
        let domain = domain.into();
        let resolver = ContextResolver::new(domain.clone(), cache, Arc::clone(&store), decoder);
        Self {
            domain,
            store,
            monitor,
            resolver,
            updaters: Vec::new(),
            settings,
        }
    }

    /// Sets the endpoint used for FE connection traps.
    #[must_use]
    pub fn with_fabric_endpoint(mut self, endpoint: FabricEndpoint) -> Self {
        self.resolver = self.resolver.with_fabric_endpoint(endpoint);
        self
    }

    /// Adds a derived cache. Updaters run in insertion order.
    #[must_use]
    pub fn with_cache_updater(mut self, updater: Arc<dyn CacheUpdater>) -> Self {
        self.updaters.push(updater);
        self
    }

    /// The domain this job processes.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Settings the job was built with.
    pub fn settings(&self) -> &NoticeJobSettings {
        &self.settings
    }

    /// Runs one cycle as laid out in the module docs. Only a failed claim is an
    /// error; per-notice failures end up in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport, NoticeJobError> {
        let domain = self.domain.as_str();
        let notices = self.claim()?;
        if notices.is_empty() {
            debug!(domain, "no pending notices");
            return Ok(CycleReport::empty(domain));
        }
        info!(domain, claimed = notices.len(), "notice cycle started");

        let convergence = wait_for_convergence(self.monitor.as_ref(), &self.settings.convergence).await;
        match &convergence {
            ConvergenceOutcome::Converged { polls } => debug!(domain, polls, "performance image converged"),
            ConvergenceOutcome::TimedOut { polls } => {
                warn!(domain, polls, "performance image did not change, continuing")
            }
            ConvergenceOutcome::Unavailable(e) => {
                warn!(domain, error = %e, "performance subsystem unavailable, continuing")
            }
        }

        let mut outcomes: Vec<Option<ProcessingOutcome>> = vec![None; notices.len()];
        let mut records: Vec<NoticeProcess> = Vec::new();
        let mut origins: Vec<Option<usize>> = Vec::new();

        for (index, notice) in notices.iter().enumerate() {
            let kind = classify(notice.trap_number);
            let context = match self.resolver.resolve(kind, notice) {
                Ok(context) => context,
                Err(e) => {
                    error!(
                        domain,
                        notice_id = %notice.id,
                        lid = %notice.issuer_lid,
                        trap = notice.trap_number,
                        error = %e,
                        "notice context could not be resolved"
                    );
                    outcomes[index] = Some(ProcessingOutcome::ContextMissing);
                    continue;
                }
            };

            let Some(node) = context.node else {
                // Endpoint and fabric-wide sources have no cache to update.
                outcomes[index] = Some(ProcessingOutcome::Processed);
                continue;
            };

            let (ports, links) = self.resolver.snapshot(node.lid);
            records.push(NoticeProcess { notice: Some(notice.clone()), kind, node, ports, links });
            origins.push(Some(index));

            if !kind.affects_neighbors() {
                continue;
            }
            for neighbour in context.related {
                match self.resolver.lookup(NodeAddress::Lid(neighbour)) {
                    Ok(node) => {
                        let (ports, links) = self.resolver.snapshot(node.lid);
                        records.push(NoticeProcess { notice: None, kind, node, ports, links });
                        origins.push(None);
                    }
                    Err(e) => warn!(
                        domain,
                        notice_id = %notice.id,
                        lid = %neighbour,
                        error = %e,
                        "neighbour skipped"
                    ),
                }
            }
        }

        // Caches read through to the store, so the write goes first.
        let persist = self.store.submit_processing_batch(domain, records.clone());

        for (mut record, origin) in records.into_iter().zip(origins) {
            if origin.is_none() {
                // Re-read so the originating record's update is not undone by a stale view.
                (record.ports, record.links) = self.resolver.snapshot(record.node.lid);
            }
            let updated = self.update_caches(&record);
            if let Some(index) = origin {
                outcomes[index] = Some(if updated {
                    ProcessingOutcome::Processed
                } else {
                    ProcessingOutcome::UpdateFailed
                });
            }
        }

        let mut report = CycleReport::empty(domain);
        report.claimed = notices.len();
        report.convergence = Some(convergence);
        report.persist = Some(persist);

        for (notice, outcome) in notices.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or(ProcessingOutcome::ContextMissing);
            let status = outcome.terminal_status();
            match self.store.set_status(domain, notice.id, status) {
                Ok(()) if outcome == ProcessingOutcome::Processed => {
                    report.processed_notices.push(Notice { status: NoticeStatus::Processed, ..notice.clone() });
                }
                Ok(()) => {}
                // Another cycle finished it first; that cycle forwards it.
                Err(e) => error!(
                    domain,
                    notice_id = %notice.id,
                    status = %status,
                    error = %e,
                    "status write failed, notice not forwarded"
                ),
            }
            report.outcomes.push((notice.id, outcome));
        }

        info!(
            domain,
            claimed = report.claimed,
            processed = report.count(ProcessingOutcome::Processed),
            context_missing = report.count(ProcessingOutcome::ContextMissing),
            update_failed = report.count(ProcessingOutcome::UpdateFailed),
            "notice cycle finished"
        );
        Ok(report)
    }

    fn claim(&self) -> Result<Vec<Notice>, NoticeJobError> {
        let domain = self.domain.as_str();
        let claim_failed = |source: StoreError| NoticeJobError::ClaimFailed { domain: domain.to_string(), source };

        let mut notices = match self.settings.inflight_reclaim {
            Some(older_than) => {
                let stale = self.store.reclaim_stale(domain, older_than).map_err(claim_failed)?;
                if !stale.is_empty() {
                    warn!(domain, count = stale.len(), "re-claimed stale in-flight notices");
                }
                stale
            }
            None => Vec::new(),
        };
        let seen: HashSet<NoticeId> = notices.iter().map(|n| n.id).collect();
        let fresh = self.store.claim_pending(domain).map_err(claim_failed)?;
        notices.extend(fresh.into_iter().filter(|n| !seen.contains(&n.id)));
        Ok(notices)
    }

    /// Runs every updater for `record`. Returns whether all succeeded.
    fn update_caches(&self, record: &NoticeProcess) -> bool {
        let mut ok = true;
        for updater in &self.updaters {
            match updater.apply(&self.domain, record) {
                Ok(()) => debug!(
                    domain = %self.domain,
                    cache = updater.name(),
                    lid = %record.node.lid,
                    "cache updated"
                ),
                Err(e) => {
                    ok = false;
                    match record.notice.as_ref() {
                        Some(notice) => error!(
                            domain = %self.domain,
                            notice_id = %notice.id,
                            lid = %record.node.lid,
                            guid = %record.node.port_guid,
                            trap = notice.trap_number,
                            error = %e,
                            "cache update failed"
                        ),
                        None => error!(
                            domain = %self.domain,
                            lid = %record.node.lid,
                            guid = %record.node.port_guid,
                            error = %e,
                            "neighbour cache update failed"
                        ),
                    }
                }
            }
        }
        ok
    }
}
