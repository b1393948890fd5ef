//! Shared fixtures for the workspace integration tests.

/// Seeded fabrics, notices, pipelines and recording listeners.
pub mod fixtures;
