//! # notice_core
//!
//! Ingestion, classification and dispatch of fabric manager notices.
//!
//! A notice is a raw trap record persisted by an external transport. The
//! [`ingestors::notice_job::NoticeJob`] claims pending notices, waits for the
//! performance subsystem to converge, resolves each notice against live and
//! persisted topology, persists the resulting working records and updates the
//! in-memory caches. Processed notices are then handed to the
//! [`core::notice_api::NoticeApi`], which classifies them into
//! [`model::event::EventDescription`]s and fans them out through the
//! [`core::dispatcher::Dispatcher`] to every registered listener.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

// Declare the modules to re-export
/// Collaborator traits and their in-memory implementations.
pub mod connections;
/// Dispatcher, Notice API and domain registry.
pub mod core;
/// Context resolution, convergence wait and the processing job.
pub mod ingestors;
/// Topology, notice and event records.
pub mod model;
/// Trap classification and payload decoding.
pub mod traps;

/// Pipeline configuration.
#[cfg(feature = "configs")]
pub mod configs;
/// Logging setup.
#[cfg(feature = "loggers")]
pub mod loggers;

// Re-export the types most callers need
pub use crate::core::dispatcher::{Dispatcher, DispatcherStats, EventListener, ListenerError, ListenerId};
pub use crate::core::notice_api::{LoggingListener, NoticeApi};
pub use crate::core::registry::{DomainPipeline, NoticeRegistry};
pub use connections::{
    CacheUpdater, DomainSnapshot, MemoryFabric, MemoryPerformanceMonitor, NoticeStore, PerformanceMonitor,
    PersistHandle, TopologyCache,
};
pub use ingestors::context_resolver::{ContextError, ContextResolver, FabricEndpoint, ResolvedContext};
pub use ingestors::convergence::{ConvergenceOutcome, ConvergenceSettings};
pub use ingestors::notice_job::{CycleReport, NoticeJob, NoticeJobError, NoticeJobSettings};
pub use model::event::{EventCategory, EventDescription, EventSource, Severity};
pub use model::notice::{Notice, NoticeId, NoticeProcess, NoticeStatus, ProcessingOutcome};
pub use traps::classifier::{classify, severity_for, SeverityOverrides, TrapKind};
pub use traps::payload::{StlPayloadDecoder, TrapPayloadDecoder};

#[cfg(feature = "configs")]
pub use configs::{ConfigError, NoticeConfig};
#[cfg(feature = "loggers")]
pub use loggers::{init_logging, LogOptions, LoggingError};
