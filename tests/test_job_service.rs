//! Job lifecycle tests
//!
//! Exercise the orchestrator end to end through its public boundary:
//! submit, poll status, fetch the result. Failure paths use the doubles from
//! `csvjobs::testing`.

mod test_helpers;

use csvjobs::error::{ResultError, ValidationError};
use csvjobs::jobs::{JobService, JobStatus};
use csvjobs::processing::TransformPipeline;
use csvjobs::storage::{FsByteStore, MemoryByteStore};
use csvjobs::testing::{
    CountingClassifier, FailingByteStore, FailingReader, GatedReader, PanickingClassifier,
    ShortWriteByteStore,
};
use csvjobs::LimitsSection;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_helpers::*;

#[tokio::test]
async fn test_upload_then_download_processed_file() {
    let service = memory_service();
    let content = PEOPLE_CSV.as_bytes().to_vec();

    let id = service
        .submit("test.csv", content.len() as u64, Cursor::new(content))
        .unwrap();
    let job = wait_for_terminal(&service, &id).await;

    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.original_file_name(), "test.csv");
    assert!(job.result_ref().is_some(), "completed job must point at its output");

    let stats = job.stats().expect("completed job carries row statistics");
    assert_eq!(stats.rows_processed, 2);
    assert_eq!(stats.rows_flagged, 1);

    let bytes = service.fetch_result(&id.to_string()).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), PEOPLE_PROCESSED);
}

#[tokio::test]
async fn test_filesystem_backend_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FsByteStore::new(temp_dir.path()).unwrap());
    let service = service_with_store(store);
    let content = PEOPLE_CSV.as_bytes().to_vec();

    let id = service
        .submit("people.csv", content.len() as u64, Cursor::new(content))
        .unwrap();
    wait_for_terminal(&service, &id).await;

    let expected_path = temp_dir.path().join(format!("{id}_processed.csv"));
    assert!(expected_path.exists(), "output should be written per job id");
    assert_eq!(
        std::fs::read_to_string(expected_path).unwrap(),
        PEOPLE_PROCESSED
    );
}

#[tokio::test]
async fn test_status_is_in_progress_until_processing_finishes() {
    let service = memory_service();
    let (reader, gate) = GatedReader::new(PEOPLE_CSV);

    let id = service
        .submit("slow.csv", PEOPLE_CSV.len() as u64, reader)
        .unwrap();

    // Submission returned while the reader is still blocked
    let job = service.status(&id.to_string()).unwrap();
    assert_eq!(job.status(), JobStatus::InProgress);
    assert!(matches!(
        service.fetch_result(&id.to_string()).await,
        Err(ResultError::NotReady)
    ));

    gate.open();
    let job = wait_for_terminal(&service, &id).await;
    assert_eq!(job.status(), JobStatus::Completed);
}

#[tokio::test]
async fn test_rejects_non_csv_without_creating_job() {
    let service = memory_service();

    let result = service.submit("report.pdf", 100, Cursor::new(vec![0u8; 100]));

    assert_eq!(result, Err(ValidationError::unsupported_type("report.pdf")));
    assert!(service.jobs().is_empty());
}

#[tokio::test]
async fn test_rejects_oversized_upload() {
    let limits = LimitsSection {
        max_file_size_bytes: 16,
        min_file_size_bytes: 0,
    };
    let service = JobService::new(Arc::new(MemoryByteStore::new()), limits);

    let result = service.submit("big.csv", 17, Cursor::new(vec![b'a'; 17]));
    assert_eq!(result, Err(ValidationError::TooLarge { size: 17, limit: 16 }));

    // Exactly at the limit is accepted
    assert!(service
        .submit("edge.csv", 16, Cursor::new(b"a,b\n1,2\n3,4\n5,6".to_vec()))
        .is_ok());
}

#[tokio::test]
async fn test_uppercase_extension_is_accepted() {
    let service = memory_service();
    let id = service
        .submit("DATA.CSV", 4, Cursor::new(b"a,b\n".to_vec()))
        .unwrap();

    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_header_only_file_completes() {
    let service = memory_service();
    let id = service
        .submit("header.csv", 6, Cursor::new(b"a,b,c\n".to_vec()))
        .unwrap();

    wait_for_terminal(&service, &id).await;
    let bytes = service.fetch_result(&id.to_string()).await.unwrap();
    assert_eq!(&bytes[..], b"a,b,c,has_email\n");
}

#[tokio::test]
async fn test_malformed_csv_marks_job_failed() {
    let service = memory_service();
    let content = b"a,b\n\"unterminated,1\n".to_vec();

    let id = service
        .submit("broken.csv", content.len() as u64, Cursor::new(content))
        .unwrap();
    let job = wait_for_terminal(&service, &id).await;

    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.result_ref().is_none());
    assert!(matches!(
        service.fetch_result(&id.to_string()).await,
        Err(ResultError::Failed)
    ));
}

#[tokio::test]
async fn test_empty_upload_is_accepted_then_fails() {
    let service = memory_service();

    let id = service.submit("empty.csv", 0, Cursor::new(Vec::new())).unwrap();

    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_empty_upload_rejected_with_minimum_size() {
    let limits = LimitsSection {
        max_file_size_bytes: 1024,
        min_file_size_bytes: 1,
    };
    let service = JobService::new(Arc::new(MemoryByteStore::new()), limits);

    let result = service.submit("empty.csv", 0, Cursor::new(Vec::new()));
    assert!(matches!(result, Err(ValidationError::EmptyFile { .. })));
    assert!(service.jobs().is_empty());
}

#[tokio::test]
async fn test_panicking_classifier_marks_job_failed() {
    let service = memory_service()
        .with_pipeline(TransformPipeline::new(Arc::new(PanickingClassifier)));

    let id = service
        .submit("boom.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();
    let job = wait_for_terminal(&service, &id).await;

    assert_eq!(job.status(), JobStatus::Failed);

    // The service keeps working after a panic
    let service = memory_service();
    let id = service
        .submit("ok.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();
    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_unavailable_storage_marks_job_failed() {
    let store = Arc::new(FailingByteStore::new());
    let service = service_with_store(store.clone());

    let id = service
        .submit("a.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();

    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Failed
    );
    assert_eq!(
        store
            .writer_requests
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn test_write_failure_mid_stream_marks_job_failed() {
    let service = service_with_store(Arc::new(ShortWriteByteStore::new(4)));

    let id = service
        .submit("a.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();

    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_read_failure_marks_job_failed() {
    let service = memory_service();

    let id = service
        .submit("reset.csv", 20, FailingReader::new("a,b\n1,2\n"))
        .unwrap();

    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_ids() {
    let service = Arc::new(memory_service());

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let content = format!("id,contact\n{i},user{i}@example.com\n");
                service
                    .submit(
                        &format!("file{i}.csv"),
                        content.len() as u64,
                        Cursor::new(content.into_bytes()),
                    )
                    .unwrap()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 50, "every submission gets its own id");

    for (i, id) in ids.iter().enumerate() {
        let job = wait_for_terminal(&service, id).await;
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.original_file_name(), format!("file{i}.csv"));

        let bytes = service.fetch_result(&id.to_string()).await.unwrap();
        assert_eq!(
            String::from_utf8(bytes.to_vec()).unwrap(),
            format!("id,contact,has_email\n{i},user{i}@example.com,true\n"),
            "each job's output must contain only its own rows"
        );
    }
}

#[tokio::test]
async fn test_concurrency_limit_queues_jobs() {
    let service = memory_service().with_max_concurrent(1);

    let (blocked_reader, gate) = GatedReader::new(PEOPLE_CSV);
    let first = service
        .submit("first.csv", PEOPLE_CSV.len() as u64, blocked_reader)
        .unwrap();
    let second = service
        .submit("second.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();

    // The second job cannot start while the first holds the only permit
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        service.status(&second.to_string()).unwrap().status(),
        JobStatus::InProgress
    );

    gate.open();
    assert_eq!(
        wait_for_terminal(&service, &first).await.status(),
        JobStatus::Completed
    );
    assert_eq!(
        wait_for_terminal(&service, &second).await.status(),
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_classifier_runs_once_per_data_row() {
    let classifier = CountingClassifier::default();
    let service = memory_service()
        .with_pipeline(TransformPipeline::new(Arc::new(classifier.clone())));
    let content = b"h\n1\n\n2\n ,\n3\n".to_vec();

    let id = service
        .submit("count.csv", content.len() as u64, Cursor::new(content))
        .unwrap();
    wait_for_terminal(&service, &id).await;

    assert_eq!(classifier.call_count(), 3, "header and blank rows are not classified");
}

#[tokio::test]
async fn test_unknown_ids() {
    let service = memory_service();

    assert!(service.status("does-not-exist").is_none());
    assert!(service
        .status("00000000-0000-4000-8000-000000000000")
        .is_none());
    assert!(matches!(
        service.fetch_result("does-not-exist").await,
        Err(ResultError::NotFound)
    ));
}

#[tokio::test]
async fn test_reaping_spares_in_progress_jobs() {
    let store = Arc::new(MemoryByteStore::new());
    let service = service_with_store(store.clone());

    let done = service
        .submit("done.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();
    wait_for_terminal(&service, &done).await;

    let (reader, gate) = GatedReader::new(PEOPLE_CSV);
    let running = service
        .submit("running.csv", PEOPLE_CSV.len() as u64, reader)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let reaped = service.reap_expired(Duration::ZERO).await;

    assert_eq!(reaped, 1);
    assert!(service.status(&done.to_string()).is_none());
    assert!(service.status(&running.to_string()).is_some());
    assert!(store.is_empty(), "reaped job output must be deleted");

    gate.open();
    assert_eq!(
        wait_for_terminal(&service, &running).await.status(),
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_background_reaper_removes_expired_jobs() {
    let service = Arc::new(memory_service());
    let id = service
        .submit("a.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();
    wait_for_terminal(&service, &id).await;

    let reaper = service.spawn_reaper(Duration::ZERO, Duration::from_millis(20));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while service.status(&id.to_string()).is_some() {
        assert!(tokio::time::Instant::now() < deadline, "reaper never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    reaper.abort();
}

#[tokio::test]
async fn test_reaping_failed_job_removes_partial_output() {
    let store = Arc::new(MemoryByteStore::new());
    let service = service_with_store(store.clone());
    let content = b"a,b\n1,2\n3,x\"y\n".to_vec();

    let id = service
        .submit("broken.csv", content.len() as u64, Cursor::new(content))
        .unwrap();
    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Failed
    );
    assert_eq!(store.len(), 1, "partial output is kept until the job is reaped");

    assert_eq!(service.reap_expired(Duration::ZERO).await, 1);
    assert!(store.is_empty(), "reaped failed job must not leave output behind");
}

#[tokio::test]
async fn test_reaping_failed_job_deletes_partial_file() {
    let temp_dir = TempDir::new().unwrap();
    let service = service_with_store(Arc::new(FsByteStore::new(temp_dir.path()).unwrap()));
    let content = b"a,b\n1,2\n\"never closed\n".to_vec();

    let id = service
        .submit("broken.csv", content.len() as u64, Cursor::new(content))
        .unwrap();
    wait_for_terminal(&service, &id).await;
    assert!(temp_dir.path().join(format!("{id}_processed.csv")).exists());

    service.reap_expired(Duration::ZERO).await;

    let left: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
    assert!(left.is_empty(), "files left after reap: {left:?}");
}

#[tokio::test]
async fn test_reaping_job_failed_mid_write_empties_store() {
    let store = Arc::new(ShortWriteByteStore::new(4));
    let service = service_with_store(store.clone());

    let id = service
        .submit("a.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();
    wait_for_terminal(&service, &id).await;

    service.reap_expired(Duration::ZERO).await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_zero_concurrency_limit_still_processes() {
    let service = memory_service().with_max_concurrent(0);

    let id = service
        .submit("a.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
        .unwrap();

    assert_eq!(
        wait_for_terminal(&service, &id).await.status(),
        JobStatus::Completed
    );
}

#[test]
fn test_submit_outside_runtime_registers_nothing() {
    let service = memory_service();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        service.submit("a.csv", PEOPLE_CSV.len() as u64, Cursor::new(PEOPLE_CSV))
    }));

    assert!(result.is_err(), "submit needs a runtime to schedule work");
    assert!(service.jobs().is_empty(), "no job may be left stuck in progress");
}
