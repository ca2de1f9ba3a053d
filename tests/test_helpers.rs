//! Test helpers and utilities for integration tests

use csvjobs::config::LimitsSection;
use csvjobs::jobs::{Job, JobId, JobService};
use csvjobs::storage::{ByteStore, MemoryByteStore};
use std::sync::Arc;
use std::time::Duration;

/// Sample upload with one email row and one plain row
#[allow(dead_code)]
pub const PEOPLE_CSV: &str = "name,email\nJohn,john@test.com\nJane,invalid-email\n";

/// Expected processed output of [`PEOPLE_CSV`]
#[allow(dead_code)]
pub const PEOPLE_PROCESSED: &str =
    "name,email,has_email\nJohn,john@test.com,true\nJane,invalid-email,false\n";

/// Create a memory-backed job service with default limits
#[allow(dead_code)]
pub fn memory_service() -> JobService {
    JobService::new(Arc::new(MemoryByteStore::new()), LimitsSection::default())
}

/// Create a job service on top of `store`
#[allow(dead_code)]
pub fn service_with_store(store: Arc<dyn ByteStore>) -> JobService {
    JobService::new(store, LimitsSection::default())
}

/// Poll until the job leaves `InProgress`, failing the test after five seconds
#[allow(dead_code)]
pub async fn wait_for_terminal(service: &JobService, id: &JobId) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = service
            .status(&id.to_string())
            .expect("submitted job should be registered");
        if job.status().is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} still in progress after 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Build a `multipart/form-data` body with a single file part
#[allow(dead_code)]
pub fn multipart_body(boundary: &str, field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
