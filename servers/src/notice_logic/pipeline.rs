//! Wiring of the per-domain pipelines and the periodic cycle loop.

use notice_core::{
    ContextResolver, DomainPipeline, MemoryFabric, NoticeApi, NoticeConfig, NoticeJob, NoticeRegistry,
    PerformanceMonitor, StlPayloadDecoder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Builds a registry whose pipelines are served by `fabric`.
pub fn build_registry(fabric: MemoryFabric, monitor: Arc<dyn PerformanceMonitor>, config: NoticeConfig) -> NoticeRegistry {
    NoticeRegistry::new(move |domain| {
        let cache = Arc::new(fabric.live_cache(domain));
        let decoder = Arc::new(StlPayloadDecoder);

        let mut resolver = ContextResolver::new(domain, cache.clone(), Arc::new(fabric.clone()), decoder.clone());
        let mut job = NoticeJob::new(
            domain,
            Arc::new(fabric.clone()),
            cache.clone(),
            Arc::clone(&monitor),
            decoder,
            config.job_settings(),
        )
        .with_cache_updater(cache);

        if let Some(endpoint) = &config.fabric_endpoint {
            resolver = resolver.with_fabric_endpoint(endpoint.clone());
            job = job.with_fabric_endpoint(endpoint.clone());
        }

        let api = NoticeApi::new(resolver, config.max_pending_events);
        if !config.severity_overrides.is_empty() {
            api.set_severity_overrides(config.severity_overrides.clone());
        }
        DomainPipeline::new(api, job)
    })
}

/// Runs one cycle per domain every `period` until `shutdown` is cancelled.
pub async fn run_cycles(registry: Arc<NoticeRegistry>, domains: Vec<String>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for domain in &domains {
                    run_domain_cycle(&registry, domain).await;
                }
            }
        }
    }
    info!("cycle loop stopped");
}

async fn run_domain_cycle(registry: &NoticeRegistry, domain: &str) {
    let pipeline = registry.get_or_create(domain);
    let report = match pipeline.run_cycle().await {
        Ok(report) => report,
        Err(e) => {
            error!(domain, error = %e, "processing cycle aborted");
            return;
        }
    };
    if let Some(handle) = report.persist {
        match handle.wait().await {
            Ok(written) => debug!(domain, written, "processing batch persisted"),
            Err(e) => error!(domain, error = %e, "processing batch not persisted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notice_core::{DomainSnapshot, EventCategory, MemoryPerformanceMonitor, Notice, Severity};
    use notice_core::model::topology::Lid;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_registry_applies_pipeline_config() {
        let fabric = MemoryFabric::new();
        fabric.add_domain("fab", DomainSnapshot::default());
        let config = NoticeConfig {
            severity_overrides: HashMap::from([(EventCategory::LinkIntegrity, Severity::Critical)]),
            ..Default::default()
        };
        let registry = build_registry(fabric, Arc::new(MemoryPerformanceMonitor::new(0)), config);
        let pipeline = registry.get_or_create("fab");
        assert_eq!(pipeline.api.severity_for(EventCategory::LinkIntegrity), Severity::Critical);
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_cycle_loop_stops_on_cancel() {
        let fabric = MemoryFabric::new();
        fabric.add_domain(
            "fab",
            DomainSnapshot { notices: vec![Notice::received(1, Lid(1), 4000, vec![])], ..Default::default() },
        );
        let registry = Arc::new(build_registry(
            fabric.clone(),
            Arc::new(MemoryPerformanceMonitor::new(0)),
            NoticeConfig::default(),
        ));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_cycles(
            registry.clone(),
            vec!["fab".to_string()],
            Duration::from_millis(10),
            shutdown.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while fabric.notices("fab")[0].status != notice_core::NoticeStatus::Processed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        registry.shutdown();
    }
}
