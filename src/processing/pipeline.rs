//! Streaming row transform
//!
//! Reads a header and then one row at a time, appends the classifier's verdict
//! as an extra column and writes the row out immediately. Only the current row
//! is held in memory, so input size is bounded by the byte store, not by RAM.

use crate::error::ProcessingError;
use crate::processing::classifier::{EmailClassifier, RowClassifier};
use crate::processing::tabular::{record_writer, RecordReader};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the appended column
pub const DERIVED_COLUMN: &str = "has_email";

/// How often progress is logged, in records
const PROGRESS_INTERVAL: u64 = 100;

/// Row counts of one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Data rows written to the output (header excluded)
    pub rows_processed: u64,
    /// Rows dropped because every field was blank
    pub rows_skipped: u64,
    /// Rows whose derived column is `true`
    pub rows_flagged: u64,
}

/// Appends one classifier-derived column to every row of a tabular stream
pub struct TransformPipeline {
    classifier: Arc<dyn RowClassifier>,
    column_name: String,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new(Arc::new(EmailClassifier::new()))
    }
}

impl TransformPipeline {
    /// Create a pipeline appending `has_email`
    pub fn new(classifier: Arc<dyn RowClassifier>) -> Self {
        Self::with_column_name(classifier, DERIVED_COLUMN)
    }

    pub fn with_column_name<S: Into<String>>(
        classifier: Arc<dyn RowClassifier>,
        column_name: S,
    ) -> Self {
        Self {
            classifier,
            column_name: column_name.into(),
        }
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// Run the transform from `input` to `output`.
    ///
    /// Output written before a failure is left in place.
    pub fn run<R: BufRead, W: Write>(
        &self,
        input: R,
        output: W,
    ) -> Result<PipelineStats, ProcessingError> {
        let mut reader = RecordReader::new(input);
        let mut writer = record_writer(output);
        let mut record = Vec::new();
        let mut stats = PipelineStats::default();

        if !reader.read_record(&mut record)? {
            return Err(ProcessingError::malformed_input("input has no header row"));
        }

        record.push(self.column_name.clone());
        writer.write_record(&record)?;
        debug!(
            columns = record.len(),
            classifier = self.classifier.name(),
            "Header written"
        );

        let mut records_read: u64 = 0;
        while reader.read_record(&mut record)? {
            records_read += 1;

            if record.iter().all(|field| field.trim().is_empty()) {
                stats.rows_skipped += 1;
                continue;
            }

            let flagged = self.classifier.classify(&record);
            if flagged {
                stats.rows_flagged += 1;
            }
            record.push(if flagged { "true" } else { "false" }.to_string());
            writer.write_record(&record)?;
            stats.rows_processed += 1;

            if records_read % PROGRESS_INTERVAL == 0 {
                info!(
                    records_read,
                    rows_processed = stats.rows_processed,
                    line = reader.line(),
                    "Processing progress"
                );
            }
        }

        writer.flush()?;

        debug!(
            rows_processed = stats.rows_processed,
            rows_skipped = stats.rows_skipped,
            rows_flagged = stats.rows_flagged,
            "Transform finished"
        );

        Ok(stats)
    }
}
