//! Execution backend: runs pipeline jobs off the request path.

pub mod backend;

pub use backend::{BackendStats, ExecutionBackend};
