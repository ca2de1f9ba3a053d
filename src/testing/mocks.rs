//! Mock implementations for testing
//!
//! Provides byte stores, classifiers and readers that fail, panic or block on
//! demand, so job failure paths can be exercised without real I/O faults.

use crate::jobs::JobId;
use crate::processing::RowClassifier;
use crate::storage::{ByteStore, MemoryByteStore, ResultRef, ResultWriter};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Byte store whose writers cannot be opened
#[derive(Debug, Default)]
pub struct FailingByteStore {
    pub writer_requests: AtomicUsize,
}

impl FailingByteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ByteStore for FailingByteStore {
    fn location(&self, job_id: &JobId) -> ResultRef {
        ResultRef::new(format!("failing://{job_id}"))
    }

    fn writer(&self, _job_id: &JobId) -> io::Result<(ResultRef, ResultWriter)> {
        self.writer_requests.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "mock store refuses writes",
        ))
    }

    async fn read(&self, location: &ResultRef) -> io::Result<Bytes> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("mock store has nothing at {location}"),
        ))
    }

    async fn remove(&self, _location: &ResultRef) -> io::Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Byte store that accepts a fixed number of bytes per job, then reports a full disk
#[derive(Debug, Clone)]
pub struct ShortWriteByteStore {
    inner: MemoryByteStore,
    capacity: usize,
}

impl ShortWriteByteStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: MemoryByteStore::new(),
            capacity,
        }
    }

    /// Number of outputs still held, complete or not
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

struct ShortWriter {
    inner: ResultWriter,
    remaining: usize,
}

impl Write for ShortWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.len() > self.remaining {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "mock disk is full"));
        }
        self.remaining -= data.len();
        self.inner.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[async_trait]
impl ByteStore for ShortWriteByteStore {
    fn location(&self, job_id: &JobId) -> ResultRef {
        self.inner.location(job_id)
    }

    fn writer(&self, job_id: &JobId) -> io::Result<(ResultRef, ResultWriter)> {
        let (location, inner) = self.inner.writer(job_id)?;
        Ok((
            location,
            Box::new(ShortWriter {
                inner,
                remaining: self.capacity,
            }),
        ))
    }

    async fn read(&self, location: &ResultRef) -> io::Result<Bytes> {
        self.inner.read(location).await
    }

    async fn remove(&self, location: &ResultRef) -> io::Result<()> {
        self.inner.remove(location).await
    }

    fn backend_name(&self) -> &'static str {
        "short-write"
    }
}

/// Classifier that panics on every data row
#[derive(Debug, Default)]
pub struct PanickingClassifier;

impl RowClassifier for PanickingClassifier {
    fn classify(&self, fields: &[String]) -> bool {
        panic!("mock classifier panicked on row with {} fields", fields.len());
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

/// Classifier that flags every row and counts how often it was asked
#[derive(Debug, Default, Clone)]
pub struct CountingClassifier {
    pub calls: Arc<AtomicUsize>,
}

impl CountingClassifier {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RowClassifier for CountingClassifier {
    fn classify(&self, _fields: &[String]) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Reader that yields `content` and then fails instead of reporting end of stream
pub struct FailingReader {
    content: io::Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: io::Cursor::new(content.into()),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.content.read(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mock upload stream reset",
            )),
            n => Ok(n),
        }
    }
}

/// Reader that blocks its first read until the paired [`Gate`] is opened or dropped
pub struct GatedReader {
    content: io::Cursor<Vec<u8>>,
    gate: Option<mpsc::Receiver<()>>,
}

/// Releases a [`GatedReader`]
pub struct Gate {
    sender: mpsc::Sender<()>,
}

impl Gate {
    pub fn open(self) {
        let _ = self.sender.send(());
    }
}

impl GatedReader {
    pub fn new(content: impl Into<Vec<u8>>) -> (Self, Gate) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                content: io::Cursor::new(content.into()),
                gate: Some(receiver),
            },
            Gate { sender },
        )
    }
}

impl Read for GatedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(gate) = self.gate.take() {
            let _ = gate.recv();
        }
        self.content.read(buf)
    }
}
