//! Row classification
//!
//! A classifier looks at one row and answers a single yes/no question about it.
//! The shipped [`EmailClassifier`] flags rows where any field looks like an
//! email address.

use once_cell::sync::Lazy;
use regex::Regex;

/// Compiled once, shared read-only by every job
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// Decides whether a row should be flagged in the derived column
pub trait RowClassifier: Send + Sync {
    /// Classify one row. Must be deterministic for a given row.
    fn classify(&self, fields: &[String]) -> bool;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Returns true if the field, after trimming surrounding whitespace, is email-shaped
pub fn is_email(field: &str) -> bool {
    EMAIL_PATTERN.is_match(field.trim())
}

/// Flags a row when any field is an email address
#[derive(Debug, Default, Clone, Copy)]
pub struct EmailClassifier;

impl EmailClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl RowClassifier for EmailClassifier {
    fn classify(&self, fields: &[String]) -> bool {
        fields.iter().any(|field| is_email(field))
    }

    fn name(&self) -> &str {
        "email"
    }
}
