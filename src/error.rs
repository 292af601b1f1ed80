// src/error.rs

use thiserror::Error;

/// Failures raised while reshaping a raw table into tidy records.
///
/// `Schema` and `Layout` abort the unit being processed (one spreadsheet, one
/// HTML table). `Parse` only costs the record it was raised for.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("parse error in {field}: {value:?} is not a valid {expected}")]
    Parse {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("layout error: row {row} has {width} cells, expected {expected}")]
    Layout {
        row: usize,
        width: usize,
        expected: String,
    },
}

impl NormalizeError {
    pub fn parse(field: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        NormalizeError::Parse {
            field,
            value: value.into(),
            expected,
        }
    }
}

/// A candidate record that was discarded, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Dropped {
    /// Human-readable location, e.g. `"Texas <- Ohio"` or `"2019 row 4"`.
    pub at: String,
    pub reason: NormalizeError,
}

/// Output of a normalizer: the tidy relation plus everything it threw away.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub dropped: Vec<Dropped>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

impl<T> Normalized<T> {
    pub fn drop_record(&mut self, at: impl Into<String>, reason: NormalizeError) {
        self.dropped.push(Dropped {
            at: at.into(),
            reason,
        });
    }
}
