//! csvjobs - asynchronous CSV processing service
//!
//! Accepts a CSV file, processes it in the background, and lets the caller poll
//! for completion and download the result. Processing appends a `has_email`
//! column that is `true` when any field of the row is an email address.
//!
//! # Overview
//!
//! - [`processing`]: strict CSV reader, row classifier and streaming transform
//! - [`storage`]: byte stores holding processed output
//! - [`jobs`]: job registry and the [`JobService`] orchestrator
//! - [`transport`]: HTTP API
//! - [`config`], [`observability`]: configuration, logging and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use csvjobs::{JobService, LimitsSection, MemoryByteStore};
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let service = JobService::new(Arc::new(MemoryByteStore::new()), LimitsSection::default());
//!
//! let csv = b"name,contact\nAnn,ann@example.com\n".to_vec();
//! let id = service
//!     .submit("people.csv", csv.len() as u64, Cursor::new(csv))
//!     .unwrap();
//!
//! // Later: poll until completed, then fetch the output
//! let _job = service.status(&id.to_string());
//! let _bytes = service.fetch_result(&id.to_string()).await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod observability;
pub mod processing;
pub mod storage;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, LimitsSection, ServiceConfig, StorageBackend};
pub use error::{ProcessingError, ResultError, ValidationError};
pub use jobs::{Job, JobId, JobService, JobStatus, JobStore};
pub use processing::{EmailClassifier, PipelineStats, RowClassifier, TransformPipeline};
pub use storage::{ByteStore, FsByteStore, MemoryByteStore, ResultRef};
