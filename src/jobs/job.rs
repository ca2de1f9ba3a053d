//! Job record and its status state machine

use crate::jobs::store::StoreError;
use crate::processing::PipelineStats;
use crate::storage::ResultRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, unguessable job identifier
pub type JobId = Uuid;

/// Job status. The only transitions are `InProgress -> Completed` and
/// `InProgress -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted file and the state of its processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    id: JobId,
    status: JobStatus,
    original_file_name: String,
    #[serde(skip)]
    result_ref: Option<ResultRef>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<PipelineStats>,
}

impl Job {
    pub(crate) fn new(id: JobId, original_file_name: String) -> Self {
        Self {
            id,
            status: JobStatus::InProgress,
            original_file_name,
            result_ref: None,
            created_at: Utc::now(),
            finished_at: None,
            stats: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    /// Where the processed output lives. Present only once the job is `Completed`.
    pub fn result_ref(&self) -> Option<&ResultRef> {
        self.result_ref.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn stats(&self) -> Option<PipelineStats> {
        self.stats
    }

    pub(crate) fn complete(
        &mut self,
        result_ref: ResultRef,
        stats: PipelineStats,
    ) -> Result<(), StoreError> {
        self.ensure_in_progress()?;
        self.status = JobStatus::Completed;
        self.result_ref = Some(result_ref);
        self.stats = Some(stats);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn fail(&mut self) -> Result<(), StoreError> {
        self.ensure_in_progress()?;
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<(), StoreError> {
        if self.status.is_terminal() {
            return Err(StoreError::AlreadyFinished {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }
}
