use chrono::Local;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// Output of [`crate::Pipeline::run`]: the transformed table and what was done to it.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub data: DataFrame,
    pub summary: ProcessingSummary,
}

/// Names of the filters used for each signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterNames {
    pub current: String,
    pub voltage: String,
    pub charge: String,
}

/// Human-readable summary of a pipeline run.
///
/// # Example
///
/// ```rust,ignore
/// let summary = pipeline.run(df)?.summary;
/// println!("Kept {} of {} rows in {}ms", summary.rows_after, summary.rows_before, summary.duration_ms);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSummary {
    /// Local time the run started, `%Y-%m-%d %H:%M:%S`.
    pub processed_at: String,
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    /// Number of rows handed to the pipeline.
    pub rows_before: usize,
    /// Number of rows after resampling, if resampling ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_after_resample: Option<usize>,
    /// Number of rows returned.
    pub rows_after: usize,

    pub columns_before: usize,
    pub columns_after: usize,

    /// Columns added by the pipeline, in the order they were added.
    pub derived_columns: Vec<String>,
    /// Per-cell voltage columns that went through the voltage filter.
    pub filtered_cell_voltage_columns: Vec<String>,
    pub filters: FilterNames,
    /// Inclusive voltage window; `None` as upper bound means unbounded.
    pub voltage_window: (f64, Option<f64>),

    /// List of actions taken, in order.
    pub actions: Vec<String>,
    /// Warnings and notes generated during processing.
    pub warnings: Vec<String>,
}

impl Default for ProcessingSummary {
    fn default() -> Self {
        Self {
            processed_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            duration_ms: 0,
            rows_before: 0,
            rows_after_resample: None,
            rows_after: 0,
            columns_before: 0,
            columns_after: 0,
            derived_columns: Vec::new(),
            filtered_cell_voltage_columns: Vec::new(),
            filters: FilterNames::default(),
            voltage_window: (0.0, None),
            actions: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ProcessingSummary {
    /// Create a new empty summary stamped with the current time.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Record a derived column once.
    pub fn add_derived_column(&mut self, column: &str) {
        if !self.derived_columns.iter().any(|c| c == column) {
            self.derived_columns.push(column.to_string());
        }
    }

    /// Number of rows dropped by resampling and windowing together.
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    /// Percentage of input rows that were dropped.
    pub fn rows_removed_percentage(&self) -> f32 {
        if self.rows_before == 0 {
            0.0
        } else {
            (self.rows_removed() as f32 / self.rows_before as f32) * 100.0
        }
    }
}
