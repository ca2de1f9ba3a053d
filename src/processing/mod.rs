//! Row processing: classification, tabular codec and the streaming transform

pub mod classifier;
pub mod pipeline;
pub mod tabular;

pub use classifier::{is_email, EmailClassifier, RowClassifier};
pub use pipeline::{PipelineStats, TransformPipeline, DERIVED_COLUMN};
pub use tabular::{ParseErrorKind, RecordReader, TabularError};
