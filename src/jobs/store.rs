//! Thread-safe job registry
//!
//! The store is the only owner of job records. Every read hands out a cloned
//! snapshot, and every status change happens under the write lock, so a
//! reader sees either the state before a transition or the state after it.

use crate::jobs::job::{Job, JobId, JobStatus};
use crate::processing::PipelineStats;
use crate::storage::ResultRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rejected job store mutation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {id} already finished with status {status}")]
    AlreadyFinished { id: JobId, status: JobStatus },
}

/// Number of jobs in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.in_progress + self.completed + self.failed
    }
}

/// Registry mapping job ids to job records
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Transitions are applied in a single assignment, so a poisoned map is still consistent
    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new in-progress job and return its id
    pub fn create<S: Into<String>>(&self, original_file_name: S) -> JobId {
        let original_file_name = original_file_name.into();
        let mut jobs = self.write_jobs();

        let mut id = Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = Uuid::new_v4();
        }

        jobs.insert(id, Job::new(id, original_file_name));
        debug!(job_id = %id, total_jobs = jobs.len(), "Job registered");
        id
    }

    /// Snapshot of a job, or `None` for unknown ids
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.read_jobs().get(id).cloned()
    }

    /// Transition `InProgress -> Completed`, recording where the output lives
    pub fn mark_completed(
        &self,
        id: &JobId,
        result_ref: ResultRef,
        stats: PipelineStats,
    ) -> Result<(), StoreError> {
        let mut jobs = self.write_jobs();
        let job = jobs.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        job.complete(result_ref, stats)
    }

    /// Transition `InProgress -> Failed`
    pub fn mark_failed(&self, id: &JobId) -> Result<(), StoreError> {
        let mut jobs = self.write_jobs();
        let job = jobs.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        job.fail()
    }

    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_jobs().is_empty()
    }

    pub fn count_by_status(&self) -> StatusCounts {
        let jobs = self.read_jobs();
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            match job.status() {
                JobStatus::InProgress => counts.in_progress += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Remove finished jobs created before `cutoff` and return them.
    ///
    /// In-progress jobs are never removed regardless of age.
    pub fn reap_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<Job> {
        let mut jobs = self.write_jobs();
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.status().is_terminal() && job.created_at() < cutoff)
            .map(Job::id)
            .collect();

        let reaped: Vec<Job> = expired.iter().filter_map(|id| jobs.remove(id)).collect();

        if reaped.is_empty() {
            debug!(remaining = jobs.len(), "No expired jobs to reap");
        } else {
            info!(
                reaped = reaped.len(),
                remaining = jobs.len(),
                "Reaped expired jobs"
            );
        }

        let stale_in_progress = jobs
            .values()
            .filter(|job| !job.status().is_terminal() && job.created_at() < cutoff)
            .count();
        if stale_in_progress > 0 {
            warn!(
                count = stale_in_progress,
                "Jobs older than the retention window are still in progress"
            );
        }

        reaped
    }
}
