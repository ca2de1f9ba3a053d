//! Error taxonomy for the job-processing service
//!
//! Errors fall into three families that never mix:
//! - [`ValidationError`]: returned synchronously from submission, no job exists
//! - [`ProcessingError`]: raised inside a scheduled job and only ever observed as
//!   the job's `Failed` status
//! - [`ResultError`]: returned when a caller asks for a job's output

use crate::processing::tabular::TabularError;
use thiserror::Error;
use tokio::task::JoinError;

/// Rejection of a submission before any job is created
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid file type '{file_name}'. Only CSV files are allowed")]
    UnsupportedType { file_name: String },

    #[error("File size {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("File is empty: {size} bytes is below the {minimum} byte minimum")]
    EmptyFile { size: u64, minimum: u64 },
}

impl ValidationError {
    /// Create unsupported type error
    pub fn unsupported_type<S: Into<String>>(file_name: S) -> Self {
        Self::UnsupportedType {
            file_name: file_name.into(),
        }
    }

    /// Short machine-readable code used in logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnsupportedType { .. } => "unsupported_type",
            ValidationError::TooLarge { .. } => "too_large",
            ValidationError::EmptyFile { .. } => "empty_file",
        }
    }
}

/// Failure of a scheduled job
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Runtime fault: {message}")]
    RuntimeFault { message: String },
}

impl ProcessingError {
    /// Create malformed input error
    pub fn malformed_input<S: Into<String>>(message: S) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Create runtime fault error
    pub fn runtime_fault<S: Into<String>>(message: S) -> Self {
        Self::RuntimeFault {
            message: message.into(),
        }
    }

    /// Translate a failed blocking task into a runtime fault, keeping the panic message
    pub fn from_join_error(error: JoinError) -> Self {
        if !error.is_panic() {
            return Self::runtime_fault(format!("job task did not run to completion: {error}"));
        }

        let payload = error.into_panic();
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };

        Self::runtime_fault(format!("job task panicked: {message}"))
    }

    /// Short machine-readable code used in logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            ProcessingError::MalformedInput { .. } => "malformed_input",
            ProcessingError::IoFailure(_) => "io_failure",
            ProcessingError::RuntimeFault { .. } => "runtime_fault",
        }
    }
}

impl From<TabularError> for ProcessingError {
    fn from(error: TabularError) -> Self {
        match error {
            TabularError::Io(e) => ProcessingError::IoFailure(e),
            parse => ProcessingError::malformed_input(parse.to_string()),
        }
    }
}

impl From<csv::Error> for ProcessingError {
    fn from(error: csv::Error) -> Self {
        match error.into_kind() {
            csv::ErrorKind::Io(e) => ProcessingError::IoFailure(e),
            other => ProcessingError::IoFailure(std::io::Error::other(format!(
                "failed to write record: {other:?}"
            ))),
        }
    }
}

/// Outcome of asking for a job's processed output when no bytes can be returned
#[derive(Debug, Error)]
pub enum ResultError {
    #[error("Job not found")]
    NotFound,

    #[error("Job is still in progress")]
    NotReady,

    #[error("Job failed to process")]
    Failed,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ResultError {
    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
