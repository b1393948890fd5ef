//! # Connections Module
//!
//! The external collaborators the pipeline consumes, expressed as traits, plus
//! in-memory implementations used by the daemon's fixture mode and by tests.
//!
//! - **`notice_store`**: the persisted notice store and topology records,
//!   including the atomic claim and the asynchronous durable write.
//! - **`topology_cache`**: the live in-memory topology and the cache-update
//!   seam.
//! - **`perf_monitor`**: the performance subsystem polled during the
//!   convergence wait.
//! - **`memory`**: `MemoryFabric` and `MemoryPerformanceMonitor`.

/// Persisted notice store and durable-write handle.
pub mod notice_store;
/// Live topology cache and cache updaters.
pub mod topology_cache;
/// Performance subsystem interface.
pub mod perf_monitor;
/// In-memory implementations of every collaborator.
pub mod memory;

pub use memory::{DomainSnapshot, MemoryFabric, MemoryPerformanceMonitor, MemoryTopologyCache};
pub use notice_store::{NodeAddress, NoticeStore, PersistCompleter, PersistHandle, StoreError};
pub use perf_monitor::{PerfError, PerformanceMonitor};
pub use topology_cache::{CacheError, CacheUpdater, TopologyCache};
