//! Job registry and lifecycle orchestration

pub mod job;
pub mod service;
pub mod store;

pub use job::{Job, JobId, JobStatus};
pub use service::JobService;
pub use store::{JobStore, StatusCounts, StoreError};
