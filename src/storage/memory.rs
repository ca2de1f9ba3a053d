//! In-memory byte store

use super::{ByteStore, ResultRef, ResultWriter};
use crate::jobs::JobId;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, PoisonError, RwLock};

type Buffers = Arc<RwLock<HashMap<String, Bytes>>>;

/// Byte store that keeps every result in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryByteStore {
    buffers: Buffers,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored results
    pub fn len(&self) -> usize {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns its buffer while the job writes; publishes it to the map when dropped
struct MemoryWriter {
    key: String,
    buffer: Vec<u8>,
    buffers: Buffers,
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let contents = Bytes::from(std::mem::take(&mut self.buffer));
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(std::mem::take(&mut self.key), contents);
    }
}

#[async_trait]
impl ByteStore for MemoryByteStore {
    fn location(&self, job_id: &JobId) -> ResultRef {
        ResultRef::new(format!("memory://{job_id}_processed.csv"))
    }

    fn writer(&self, job_id: &JobId) -> io::Result<(ResultRef, ResultWriter)> {
        let location = self.location(job_id);
        let writer = MemoryWriter {
            key: location.as_str().to_string(),
            buffer: Vec::new(),
            buffers: Arc::clone(&self.buffers),
        };
        Ok((location, Box::new(writer)))
    }

    async fn read(&self, location: &ResultRef) -> io::Result<Bytes> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no stored result at {location}"),
                )
            })
    }

    async fn remove(&self, location: &ResultRef) -> io::Result<()> {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(location.as_str());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
