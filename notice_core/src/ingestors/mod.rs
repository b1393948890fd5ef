//! # Notice Ingestors Module
//!
//! Everything that turns claimed notices into resolved, persisted and cached
//! state.
//!
//! - **`context_resolver`**: finds the node, port or endpoint a notice is
//!   about, live cache first, persisted store second.
//! - **`convergence`**: the bounded wait for the performance subsystem to
//!   publish a new image before derived data is trusted.
//! - **`notice_job`**: one claim-and-process cycle for a domain.

/// Resolution of a notice to its event source and related nodes.
pub mod context_resolver;
/// Bounded wait for the performance subsystem.
pub mod convergence;
/// The claim-and-process batch job.
pub mod notice_job;

pub use context_resolver::{ContextError, ContextResolver, FabricEndpoint, ResolvedContext};
pub use convergence::{ConvergenceOutcome, ConvergenceSettings};
pub use notice_job::{CycleReport, NoticeJob, NoticeJobError, NoticeJobSettings};
