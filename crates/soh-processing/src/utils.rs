//! Shared helpers for reading and writing measurement columns.
//!
//! Every stage works on plain `f64` slices; these helpers move data between
//! the polars table and those slices and enforce the shape rules on the way.

use crate::error::{ProcessingError, Result};
use polars::prelude::*;

// =============================================================================
// Column Names
// =============================================================================

/// Time in seconds.
pub const TIME_S: &str = "time_s";
/// Time in hours.
pub const TIME_H: &str = "time_h";
/// Current (A).
pub const CURRENT: &str = "I";
/// Voltage (V).
pub const VOLTAGE: &str = "U";
/// Precomputed charge counter (Ah).
pub const CHARGE: &str = "Q";
/// Integrated energy (kWh-equivalent).
pub const ENERGY: &str = "E";
/// Charge integrated from current (Ah).
pub const CHARGE_CALC: &str = "Q_calc";
/// Substring that marks a per-cell voltage column.
pub const CELL_VOLTAGE_MARKER: &str = "cell_voltage";

const SECONDS_PER_HOUR: f64 = 3600.0;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// Column Access
// =============================================================================

/// Check whether the table has a column with this name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Read a numeric column as `f64` values.
///
/// # Errors
///
/// Fails if the column is missing, not numeric, or contains nulls.
pub fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| ProcessingError::ColumnNotFound(name.to_string()))?;
    let series = column.as_materialized_series();

    if !is_numeric_dtype(series.dtype()) {
        return Err(ProcessingError::NonNumericColumn {
            column: name.to_string(),
            dtype: series.dtype().to_string(),
        });
    }

    let null_count = series.null_count();
    if null_count > 0 {
        return Err(ProcessingError::NullValues {
            column: name.to_string(),
            count: null_count,
        });
    }

    let floats = series.cast(&DataType::Float64)?;
    Ok(floats.f64()?.into_no_null_iter().collect())
}

/// Add or replace a `Float64` column.
///
/// # Errors
///
/// Fails with [`ProcessingError::LengthMismatch`] if `values` does not have
/// one entry per row.
pub fn set_values(df: &mut DataFrame, name: &str, values: Vec<f64>) -> Result<()> {
    if values.len() != df.height() {
        return Err(ProcessingError::LengthMismatch {
            column: name.to_string(),
            expected: df.height(),
            actual: values.len(),
        });
    }
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Names of all per-cell voltage columns, in table order.
pub fn cell_voltage_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|c| c.as_str().contains(CELL_VOLTAGE_MARKER))
        .map(|c| c.to_string())
        .collect()
}

/// Make sure the table has an hour-based time column.
///
/// When only `time_s` is present, `time_h` is derived from it. Returns
/// `true` if the column was added.
pub fn ensure_time_hours(df: &mut DataFrame) -> Result<bool> {
    if has_column(df, TIME_H) {
        return Ok(false);
    }
    if !has_column(df, TIME_S) {
        return Err(ProcessingError::ColumnNotFound(TIME_H.to_string()));
    }
    let hours = numeric_values(df, TIME_S)?
        .into_iter()
        .map(|s| s / SECONDS_PER_HOUR)
        .collect();
    set_values(df, TIME_H, hours)?;
    Ok(true)
}
