//! Opaque storage for processed output
//!
//! A [`ByteStore`] hands out one streaming writer per job and later returns the
//! finished bytes by reference. The job registry never holds output bytes; it
//! only keeps the [`ResultRef`] returned by [`ByteStore::writer`].

pub mod fs;
pub mod memory;

use crate::jobs::JobId;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

pub use fs::FsByteStore;
pub use memory::MemoryByteStore;

/// Location of a job's processed output inside a byte store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultRef(String);

impl ResultRef {
    pub fn new<S: Into<String>>(location: S) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Streaming sink handed to the pipeline
pub type ResultWriter = Box<dyn Write + Send>;

/// Persistence for processed output, keyed by job id
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Where the output of `job_id` lives, whether or not it was ever written
    fn location(&self, job_id: &JobId) -> ResultRef;

    /// Open the destination for `job_id`. Each job writes exactly once.
    fn writer(&self, job_id: &JobId) -> io::Result<(ResultRef, ResultWriter)>;

    /// Read back everything written to `location`
    async fn read(&self, location: &ResultRef) -> io::Result<Bytes>;

    /// Delete `location`. Removing something already gone is not an error.
    async fn remove(&self, location: &ResultRef) -> io::Result<()>;

    /// Backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}
