//! # Notice API
//!
//! The facade a session talks to. It owns a started [`Dispatcher`], turns
//! notices into [`EventDescription`]s and lets callers subscribe and tune
//! severities.
//!
//! Resolution here is best effort: when a notice's context cannot be
//! resolved the event is still sent, with no source. Unsupported traps are
//! logged and produce no event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::dispatcher::{Dispatcher, DispatcherStats, EventListener, ListenerError, ListenerId};
use crate::ingestors::context_resolver::ContextResolver;
use crate::model::event::{EventCategory, EventDescription, Severity};
use crate::model::notice::Notice;
use crate::traps::classifier::{classify, SeverityOverrides};

/// # Notice API
///
/// One per domain. Dropping it stops its dispatcher.
pub struct NoticeApi {
    resolver: ContextResolver,
    severities: SeverityOverrides,
    dispatcher: Dispatcher,
    cleaned_up: AtomicBool,
}

impl NoticeApi {
    /// Builds the API and starts its dispatcher on the current tokio runtime.
    pub fn new(resolver: ContextResolver, max_pending_events: Option<usize>) -> Self {
        let dispatcher = Dispatcher::new(max_pending_events);
        dispatcher.start();
        info!(domain = resolver.domain(), "notice api started");
        Self {
            resolver,
            severities: SeverityOverrides::default(),
            dispatcher,
            cleaned_up: AtomicBool::new(false),
        }
    }

    /// The domain this API serves.
    pub fn domain(&self) -> &str {
        self.resolver.domain()
    }

    /// Classifies `notices`, resolves their sources and enqueues the
    /// resulting events. Returns how many events were enqueued.
    pub fn submit_raw(&self, notices: &[Notice]) -> usize {
        let events: Vec<EventDescription> = notices.iter().filter_map(|n| self.describe(n)).collect();
        let count = events.len();
        self.dispatcher.enqueue(events);
        count
    }

    /// The event a notice would produce, or `None` for unsupported traps.
    pub fn describe(&self, notice: &Notice) -> Option<EventDescription> {
        let kind = classify(notice.trap_number);
        let Some(category) = kind.category() else {
            warn!(
                domain = self.domain(),
                notice_id = %notice.id,
                trap = notice.trap_number,
                "unsupported trap, no event"
            );
            return None;
        };

        let (source, related) = match self.resolver.resolve(kind, notice) {
            Ok(context) => (Some(context.source), context.related),
            Err(e) => {
                error!(
                    domain = self.domain(),
                    notice_id = %notice.id,
                    lid = %notice.issuer_lid,
                    trap = notice.trap_number,
                    error = %e,
                    "event source unresolved"
                );
                (None, Vec::new())
            }
        };

        Some(EventDescription {
            id: notice.id,
            timestamp: notice.received_at,
            trap: kind,
            category,
            severity: self.severities.severity_for(category),
            source,
            related,
        })
    }

    /// Subscribes `listener` to every event delivered from now on.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.dispatcher.add_listener(listener)
    }

    /// Unsubscribes. Returns whether the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    /// Replaces the severity override table. An empty map restores defaults.
    pub fn set_severity_overrides(&self, rules: HashMap<EventCategory, Severity>) {
        info!(domain = self.domain(), rules = rules.len(), "severity overrides replaced");
        self.severities.replace(rules);
    }

    /// Severity `category` currently maps to.
    pub fn severity_for(&self, category: EventCategory) -> Severity {
        self.severities.severity_for(category)
    }

    /// Dispatcher counters.
    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// False once `cleanup` ran.
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Stops the dispatcher. Safe to call more than once.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispatcher.stop();
        info!(domain = self.domain(), "notice api cleaned up");
    }

    /// Waits until the dispatcher's consumer has exited. Call after `cleanup`.
    pub async fn stopped(&self) {
        self.dispatcher.join().await;
    }
}

impl Drop for NoticeApi {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Writes every delivered event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_new_events(&self, events: &[EventDescription]) -> Result<(), ListenerError> {
        for event in events {
            let source = event
                .source
                .as_ref()
                .map_or_else(|| "unknown".to_string(), |s| s.to_string());
            info!(
                notice_id = %event.id,
                trap = %event.trap,
                category = ?event.category,
                severity = %event.severity,
                source = %source,
                related = ?event.related,
                "fabric event"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::memory::{DomainSnapshot, MemoryFabric};
    use crate::model::event::EventSource;
    use crate::model::notice::NoticeId;
    use crate::model::topology::{Guid, Lid, Node, NodeType};
    use crate::traps::payload::{encode, StlPayloadDecoder};
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const DOMAIN: &str = "fab";

    fn api() -> NoticeApi {
        let fabric = MemoryFabric::new();
        fabric.add_domain(
            DOMAIN,
            DomainSnapshot {
                nodes: vec![Node {
                    lid: Lid(5),
                    port_guid: Guid(0x55),
                    description: "hfi5".into(),
                    node_type: NodeType::ChannelAdapter,
                    num_ports: 1,
                }],
                ..Default::default()
            },
        );
        let resolver = ContextResolver::new(
            DOMAIN,
            Arc::new(fabric.live_cache(DOMAIN)),
            Arc::new(fabric),
            Arc::new(StlPayloadDecoder),
        );
        NoticeApi::new(resolver, None)
    }

    fn integrity(id: u64, lid: u32) -> Notice {
        Notice::received(id, Lid(lid), 129, encode::lid(Lid(lid), None))
    }

    struct Forward(mpsc::UnboundedSender<EventDescription>);

    impl EventListener for Forward {
        fn on_new_events(&self, events: &[EventDescription]) -> Result<(), ListenerError> {
            for e in events {
                let _ = self.0.send(e.clone());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submit_raw_delivers_classified_events() {
        let api = api();
        let (tx, mut rx) = mpsc::unbounded_channel();
        api.add_listener(Arc::new(Forward(tx)));

        let enqueued = api.submit_raw(&[integrity(1, 5), integrity(2, 77), Notice::received(3, Lid(5), 4242, vec![])]);
        assert_eq!(enqueued, 2);

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.id, NoticeId(1));
        assert_eq!(first.category, EventCategory::LinkIntegrity);
        assert_eq!(first.severity, Severity::Warning);
        assert!(matches!(first.source, Some(EventSource::Node { lid: Lid(5), .. })));

        // unresolvable context still yields an event, without a source
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.id, NoticeId(2));
        assert!(second.source.is_none());
    }

    #[tokio::test]
    async fn test_severity_override_precedence() {
        let api = api();
        let notice = integrity(1, 5);
        assert_eq!(api.describe(&notice).unwrap().severity, Severity::Warning);

        api.set_severity_overrides(HashMap::from([(EventCategory::LinkIntegrity, Severity::Critical)]));
        assert_eq!(api.describe(&notice).unwrap().severity, Severity::Critical);

        api.set_severity_overrides(HashMap::new());
        assert_eq!(api.describe(&notice).unwrap().severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_describe_is_stable() {
        let api = api();
        let notice = integrity(9, 5);
        let a = api.describe(&notice).unwrap();
        let b = api.describe(&notice).unwrap();
        assert_eq!((a.category, a.severity, a.source), (b.category, b.severity, b.source));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let api = api();
        assert!(api.is_running());
        api.cleanup();
        api.cleanup();
        timeout(Duration::from_secs(5), api.stopped()).await.unwrap();
        assert!(!api.is_running());
        assert_eq!(api.submit_raw(&[integrity(1, 5)]), 1);
        assert_eq!(api.stats().events_delivered, 0);
    }

    #[tokio::test]
    async fn test_logging_listener_accepts_any_event() {
        let api = api();
        let seen = Arc::new(Mutex::new(0usize));
        struct Count(Arc<Mutex<usize>>);
        impl EventListener for Count {
            fn on_new_events(&self, events: &[EventDescription]) -> Result<(), ListenerError> {
                *self.0.lock() += events.len();
                Ok(())
            }
        }
        api.add_listener(Arc::new(LoggingListener));
        api.add_listener(Arc::new(Count(seen.clone())));
        api.submit_raw(&[integrity(1, 5)]);
        timeout(Duration::from_secs(5), async {
            while *seen.lock() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(api.stats().listener_failures, 0);
    }
}
