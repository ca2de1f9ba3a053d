//! Job lifecycle orchestration
//!
//! [`JobService`] validates submissions, registers jobs, and runs each job's
//! transform on its own Tokio task. Callers never wait on processing: they get
//! an id back immediately and poll [`JobService::status`] or
//! [`JobService::fetch_result`].

use crate::config::{LimitsSection, ServiceConfig, StorageBackend};
use crate::error::{ProcessingError, ResultError, ValidationError};
use crate::jobs::job::{Job, JobId, JobStatus};
use crate::jobs::store::JobStore;
use crate::job_span;
use crate::observability::metrics;
use crate::processing::{PipelineStats, TransformPipeline};
use crate::storage::{ByteStore, FsByteStore, MemoryByteStore, ResultRef};
use bytes::Bytes;
use chrono::Utc;
use std::io::{BufReader, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument, Span};
use uuid::Uuid;

/// Accepts files, schedules their processing and answers status queries
pub struct JobService {
    jobs: JobStore,
    bytes: Arc<dyn ByteStore>,
    pipeline: Arc<TransformPipeline>,
    limits: LimitsSection,
    permits: Option<Arc<Semaphore>>,
}

impl JobService {
    pub fn new(bytes: Arc<dyn ByteStore>, limits: LimitsSection) -> Self {
        Self {
            jobs: JobStore::new(),
            bytes,
            pipeline: Arc::new(TransformPipeline::default()),
            limits,
            permits: None,
        }
    }

    /// Replace the default email pipeline
    pub fn with_pipeline(mut self, pipeline: TransformPipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Allow at most `max_concurrent` jobs to process at once. Zero is raised to one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        if max_concurrent == 0 {
            warn!("max_concurrent of 0 would stall every job, using 1");
        }
        self.permits = Some(Arc::new(Semaphore::new(max_concurrent.max(1))));
        self
    }

    /// Build the service described by `config`, opening its byte store
    pub fn from_config(config: &ServiceConfig) -> std::io::Result<Self> {
        let bytes: Arc<dyn ByteStore> = match config.storage.backend {
            StorageBackend::Filesystem => Arc::new(FsByteStore::new(&config.storage.dir)?),
            StorageBackend::Memory => Arc::new(MemoryByteStore::new()),
        };

        info!(
            backend = bytes.backend_name(),
            storage_dir = %config.storage.dir.display(),
            max_file_size_bytes = config.limits.max_file_size_bytes,
            max_concurrent = ?config.jobs.max_concurrent,
            "Job service initialized"
        );

        let service = Self::new(bytes, config.limits.clone());
        Ok(match config.jobs.max_concurrent {
            Some(max_concurrent) => service.with_max_concurrent(max_concurrent),
            None => service,
        })
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn backend_name(&self) -> &'static str {
        self.bytes.backend_name()
    }

    pub fn limits(&self) -> &LimitsSection {
        &self.limits
    }

    /// Check a submission against the type and size rules without creating a job
    pub fn validate(&self, file_name: &str, declared_size: u64) -> Result<(), ValidationError> {
        if !file_name.to_lowercase().ends_with(".csv") {
            return Err(ValidationError::unsupported_type(file_name));
        }
        if declared_size > self.limits.max_file_size_bytes {
            return Err(ValidationError::TooLarge {
                size: declared_size,
                limit: self.limits.max_file_size_bytes,
            });
        }
        if declared_size < self.limits.min_file_size_bytes {
            return Err(ValidationError::EmptyFile {
                size: declared_size,
                minimum: self.limits.min_file_size_bytes,
            });
        }
        Ok(())
    }

    /// Validate and register a file, then process it in the background.
    ///
    /// Returns as soon as the job is registered.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime. Nothing is registered in
    /// that case.
    pub fn submit<R>(
        &self,
        file_name: &str,
        declared_size: u64,
        content: R,
    ) -> Result<JobId, ValidationError>
    where
        R: Read + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => panic!("JobService::submit requires a Tokio runtime: {e}"),
        };

        if let Err(error) = self.validate(file_name, declared_size) {
            metrics().job_rejected();
            warn!(
                file_name,
                declared_size,
                reason = error.code(),
                "Submission rejected"
            );
            return Err(error);
        }

        let job_id = self.jobs.create(file_name);
        metrics().job_submitted();
        info!(
            job_id = %job_id,
            file_name,
            declared_size,
            "Job submitted"
        );

        let unit = JobUnit {
            job_id,
            jobs: self.jobs.clone(),
            bytes: Arc::clone(&self.bytes),
            pipeline: Arc::clone(&self.pipeline),
            permits: self.permits.clone(),
        };
        let span = job_span!(job_id = %job_id, file_name = %file_name);
        runtime.spawn(unit.run(content).instrument(span));

        Ok(job_id)
    }

    /// Snapshot of a job. Ids that are not valid UUIDs are simply unknown.
    pub fn status(&self, id: &str) -> Option<Job> {
        let id = Uuid::parse_str(id).ok()?;
        self.jobs.get(&id)
    }

    /// Processed output of a completed job
    pub async fn fetch_result(&self, id: &str) -> Result<Bytes, ResultError> {
        let job = self.status(id).ok_or(ResultError::NotFound)?;

        match job.status() {
            JobStatus::InProgress => Err(ResultError::NotReady),
            JobStatus::Failed => Err(ResultError::Failed),
            JobStatus::Completed => {
                let location = job.result_ref().ok_or_else(|| {
                    ResultError::internal_error("completed job has no result location")
                })?;

                self.bytes.read(location).await.map_err(|e| {
                    error!(
                        job_id = %job.id(),
                        location = %location,
                        error = %e,
                        "Failed to read processed output"
                    );
                    ResultError::internal_error(format!("failed to read processed output: {e}"))
                })
            }
        }
    }

    /// Drop finished jobs created more than `retention` ago, along with their output
    pub async fn reap_expired(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return 0;
        };

        let reaped = self.jobs.reap_finished_before(cutoff);
        for job in &reaped {
            // Failed jobs have no result location but may have left partial output
            let location = job
                .result_ref()
                .cloned()
                .unwrap_or_else(|| self.bytes.location(&job.id()));
            if let Err(e) = self.bytes.remove(&location).await {
                warn!(
                    job_id = %job.id(),
                    location = %location,
                    error = %e,
                    "Failed to remove output of reaped job"
                );
            }
        }

        metrics().jobs_reaped(reaped.len() as u64);
        reaped.len()
    }

    /// Run [`JobService::reap_expired`] every `interval` until the runtime shuts down
    pub fn spawn_reaper(
        self: &Arc<Self>,
        retention: Duration,
        interval: Duration,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // First tick completes immediately, skip it

            loop {
                ticker.tick().await;
                let reaped = service.reap_expired(retention).await;
                debug!(
                    reaped,
                    retention_secs = retention.as_secs(),
                    "Reaper pass finished"
                );
            }
        })
    }
}

/// Everything one scheduled job needs, detached from the service
struct JobUnit {
    job_id: JobId,
    jobs: JobStore,
    bytes: Arc<dyn ByteStore>,
    pipeline: Arc<TransformPipeline>,
    permits: Option<Arc<Semaphore>>,
}

impl JobUnit {
    async fn run<R>(self, content: R)
    where
        R: Read + Send + 'static,
    {
        // Held until the job is finalized
        let _permit = match &self.permits {
            Some(permits) => match Arc::clone(permits).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!("Concurrency limiter closed, running job without a permit");
                    None
                }
            },
            None => None,
        };

        debug!("Job processing started");
        let started = Instant::now();

        let bytes = Arc::clone(&self.bytes);
        let pipeline = Arc::clone(&self.pipeline);
        let job_id = self.job_id;
        let span = Span::current();

        let outcome = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            transform(bytes.as_ref(), &pipeline, &job_id, content)
        })
        .await
        .unwrap_or_else(|join_error| Err(ProcessingError::from_join_error(join_error)));

        self.finalize(outcome, started.elapsed());
    }

    fn finalize(
        &self,
        outcome: Result<(ResultRef, PipelineStats), ProcessingError>,
        elapsed: Duration,
    ) {
        match outcome {
            Ok((location, stats)) => {
                if let Err(e) = self.jobs.mark_completed(&self.job_id, location, stats) {
                    error!(error = %e, "Could not record job completion");
                    return;
                }
                metrics().job_completed(elapsed, &stats);
                info!(
                    rows_processed = stats.rows_processed,
                    rows_skipped = stats.rows_skipped,
                    rows_flagged = stats.rows_flagged,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Job completed"
                );
            }
            Err(processing_error) => {
                if let Err(e) = self.jobs.mark_failed(&self.job_id) {
                    error!(error = %e, "Could not record job failure");
                    return;
                }
                metrics().job_failed(
                    elapsed,
                    matches!(processing_error, ProcessingError::RuntimeFault { .. }),
                );
                error!(
                    error = %processing_error,
                    reason = processing_error.code(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Job failed"
                );
            }
        }
    }
}

/// Blocking body of a job: open the destination and stream the transform into it
fn transform<R: Read>(
    bytes: &dyn ByteStore,
    pipeline: &TransformPipeline,
    job_id: &JobId,
    content: R,
) -> Result<(ResultRef, PipelineStats), ProcessingError> {
    let (location, writer) = bytes.writer(job_id)?;
    let stats = pipeline.run(BufReader::new(content), writer)?;
    Ok((location, stats))
}
