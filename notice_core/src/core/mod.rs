//! # Core Delivery Module
//!
//! The event side of the pipeline.
//!
//! - **`dispatcher`**: single-consumer fan-out of classified events to
//!   registered listeners.
//! - **`notice_api`**: the per-domain facade that classifies notices, owns
//!   the dispatcher and manages subscriptions and severity overrides.
//! - **`registry`**: the explicit domain-keyed table of pipelines held by the
//!   composition root.

/// Queue, listener set and consumer task.
pub mod dispatcher;
/// Classification facade over the dispatcher.
pub mod notice_api;
/// Per-domain pipelines.
pub mod registry;

pub use dispatcher::{Dispatcher, DispatcherStats, EventListener, ListenerError, ListenerId};
pub use notice_api::{LoggingListener, NoticeApi};
pub use registry::{DomainPipeline, NoticeRegistry};
