//! Custom error types for the measurement pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Errors fall
//! into three groups: load errors (the table could not be read), shape errors
//! (a stage found a column missing, non-numeric, incomplete or misaligned)
//! and empty-result errors (no rows left to re-baseline).
//!
//! Errors are serializable so the CLI can emit them as JSON.

use crate::pipeline::ProcessingStage;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the measurement pipeline.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Column was not found in the measurement table.
    #[error("Column '{0}' not found in measurement table")]
    ColumnNotFound(String),

    /// Column exists but does not hold numeric data.
    #[error("Column '{column}' is not numeric (found {dtype})")]
    NonNumericColumn { column: String, dtype: String },

    /// Numeric column contains missing values.
    #[error("Column '{column}' contains {count} null values")]
    NullValues { column: String, count: usize },

    /// A filter or derivation produced a column of the wrong length.
    #[error("Column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Timestamps decrease somewhere in the table.
    #[error("Column '{column}' is not time-ordered at row {row}")]
    UnorderedTime { column: String, row: usize },

    /// No rows were left when a stage needed at least one.
    #[error("No rows left after {}", .stage.display_name())]
    EmptyResult { stage: ProcessingStage },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The input file format could not be determined or is not supported.
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for machine-readable output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::NonNumericColumn { .. } => "NON_NUMERIC_COLUMN",
            Self::NullValues { .. } => "NULL_VALUES",
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::UnorderedTime { .. } => "UNORDERED_TIME",
            Self::EmptyResult { .. } => "EMPTY_RESULT",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error comes from the shape of the table rather than
    /// from loading it.
    pub fn is_shape_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::NonNumericColumn { .. }
            | Self::NullValues { .. }
            | Self::LengthMismatch { .. }
            | Self::UnorderedTime { .. } => true,
            Self::WithContext { source, .. } => source.is_shape_error(),
            _ => false,
        }
    }

    /// Check if this error means the table ran out of rows.
    pub fn is_empty_result(&self) -> bool {
        match self {
            Self::EmptyResult { .. } => true,
            Self::WithContext { source, .. } => source.is_empty_result(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ProcessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProcessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}
