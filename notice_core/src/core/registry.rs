//! # Domain Registry
//!
//! One [`DomainPipeline`] (a Notice API plus its processing job) per fabric
//! domain, created on first use by a factory supplied by the composition
//! root. The registry is an ordinary value owned by whoever builds it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::core::notice_api::NoticeApi;
use crate::ingestors::notice_job::{CycleReport, NoticeJob, NoticeJobError};

/// Everything one domain needs: its API and its processing job.
pub struct DomainPipeline {
    /// Classification and delivery.
    pub api: NoticeApi,
    /// Claim and processing.
    pub job: NoticeJob,
}

impl DomainPipeline {
    /// Pairs an API with its job.
    pub fn new(api: NoticeApi, job: NoticeJob) -> Self {
        Self { api, job }
    }

    /// Runs one processing cycle and forwards the processed notices to the
    /// API for classification and dispatch.
    pub async fn run_cycle(&self) -> Result<CycleReport, NoticeJobError> {
        let report = self.job.run_cycle().await?;
        if !report.processed_notices.is_empty() {
            self.api.submit_raw(&report.processed_notices);
        }
        Ok(report)
    }
}

type PipelineFactory = Box<dyn Fn(&str) -> DomainPipeline + Send + Sync>;

/// # Notice Registry
///
/// Domain name to pipeline. Owned by the composition root; dropping it shuts
/// every pipeline down.
pub struct NoticeRegistry {
    pipelines: Mutex<HashMap<String, Arc<DomainPipeline>>>,
    factory: PipelineFactory,
}

impl NoticeRegistry {
    /// An empty registry that builds pipelines with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> DomainPipeline + Send + Sync + 'static,
    {
        Self {
            pipelines: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Returns the pipeline of `domain`, building it if needed.
    pub fn get_or_create(&self, domain: &str) -> Arc<DomainPipeline> {
        let mut pipelines = self.pipelines.lock();
        let entry = pipelines.entry(domain.to_string()).or_insert_with(|| {
            info!(domain, "domain pipeline created");
            Arc::new((self.factory)(domain))
        });
        Arc::clone(entry)
    }

    /// The pipeline of `domain`, if already built.
    pub fn get(&self, domain: &str) -> Option<Arc<DomainPipeline>> {
        self.pipelines.lock().get(domain).cloned()
    }

    /// Names of the built pipelines, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of built pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.lock().len()
    }

    /// True when no pipeline was built yet.
    pub fn is_empty(&self) -> bool {
        self.pipelines.lock().is_empty()
    }

    /// Drops the pipeline of `domain` and stops its dispatcher.
    pub fn remove(&self, domain: &str) -> bool {
        let removed = self.pipelines.lock().remove(domain);
        match removed {
            Some(pipeline) => {
                pipeline.api.cleanup();
                info!(domain, "domain pipeline removed");
                true
            }
            None => false,
        }
    }

    /// Stops and drops every pipeline.
    pub fn shutdown(&self) {
        let drained: Vec<(String, Arc<DomainPipeline>)> = self.pipelines.lock().drain().collect();
        for (domain, pipeline) in &drained {
            pipeline.api.cleanup();
            info!(domain = domain.as_str(), "domain pipeline shut down");
        }
    }
}

impl Drop for NoticeRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::{EventListener, ListenerError};
    use crate::connections::memory::{DomainSnapshot, MemoryFabric, MemoryPerformanceMonitor};
    use crate::ingestors::context_resolver::ContextResolver;
    use crate::ingestors::notice_job::NoticeJobSettings;
    use crate::model::event::EventDescription;
    use crate::model::notice::{Notice, NoticeId};
    use crate::model::topology::{Guid, Lid, Node, NodeType};
    use crate::traps::payload::{encode, StlPayloadDecoder};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn registry(fabric: &MemoryFabric) -> NoticeRegistry {
        let fabric = fabric.clone();
        NoticeRegistry::new(move |domain| {
            let cache = Arc::new(fabric.live_cache(domain));
            let resolver =
                ContextResolver::new(domain, cache.clone(), Arc::new(fabric.clone()), Arc::new(StlPayloadDecoder));
            let job = NoticeJob::new(
                domain,
                Arc::new(fabric.clone()),
                cache.clone(),
                Arc::new(MemoryPerformanceMonitor::new(0)),
                Arc::new(StlPayloadDecoder),
                NoticeJobSettings::default(),
            )
            .with_cache_updater(cache);
            DomainPipeline::new(NoticeApi::new(resolver, None), job)
        })
    }

    fn seeded() -> MemoryFabric {
        let fabric = MemoryFabric::new();
        for domain in ["a", "b"] {
            fabric.add_domain(
                domain,
                DomainSnapshot {
                    nodes: vec![Node {
                        lid: Lid(1),
                        port_guid: Guid(1),
                        description: "hfi1".into(),
                        node_type: NodeType::ChannelAdapter,
                        num_ports: 1,
                    }],
                    notices: vec![Notice::received(1, Lid(1), 129, encode::lid(Lid(1), None))],
                    ..Default::default()
                },
            );
        }
        fabric
    }

    struct Forward(mpsc::UnboundedSender<NoticeId>);

    impl EventListener for Forward {
        fn on_new_events(&self, events: &[EventDescription]) -> Result<(), ListenerError> {
            for e in events {
                let _ = self.0.send(e.id);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pipeline_created_once_per_domain() {
        let registry = registry(&seeded());
        let first = registry.get_or_create("a");
        let again = registry.get_or_create("a");
        assert!(Arc::ptr_eq(&first, &again));
        registry.get_or_create("b");
        assert_eq!(registry.domains(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_cycle_forwards_processed_notices_to_listeners() {
        let registry = registry(&seeded());
        let pipeline = registry.get_or_create("a");
        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline.api.add_listener(Arc::new(Forward(tx)));

        let report = pipeline.run_cycle().await.unwrap();
        assert_eq!(report.processed_notices.len(), 1);
        let id = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(id, Some(NoticeId(1)));
    }

    #[tokio::test]
    async fn test_remove_and_shutdown_stop_dispatchers() {
        let registry = registry(&seeded());
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(!a.api.is_running());
        assert!(b.api.is_running());

        registry.shutdown();
        assert!(registry.is_empty());
        assert!(!b.api.is_running());
    }
}
