//! The individual transform stages of the measurement pipeline.
//!
//! Each stage is usable on its own; [`crate::Pipeline`] sequences them.
//! Stages assume the table's rows are time-ordered and operate on whole
//! columns, so a failure leaves no partially transformed column behind in
//! the returned table.

use crate::error::{ProcessingError, Result};
use crate::pipeline::ProcessingStage;
use crate::signal::{SignalFilter, cumulative_trapezoid, offset};
use crate::utils::{
    CHARGE, CHARGE_CALC, CURRENT, ENERGY, TIME_H, TIME_S, VOLTAGE, cell_voltage_columns,
    numeric_values, set_values,
};
use polars::prelude::*;
use tracing::{debug, warn};

/// Power is recorded in W; energy is reported per 1000 W.
const POWER_SCALE: f64 = 1000.0;

/// Bucket indices past 2^53 are no longer distinct as `f64`.
const MAX_BUCKET_INDEX: f64 = 9_007_199_254_740_992.0;

/// Re-index the table onto a uniform grid of `interval_s` seconds.
///
/// Rows are bucketed by `floor(time_s / interval_s)` and the first row of
/// each bucket is kept. Values are not averaged or interpolated, and buckets
/// without a sample produce no row.
///
/// # Errors
///
/// Fails if `time_s` is missing, non-numeric or decreasing, and if the
/// interval is too small to give every sample a distinct bucket index.
pub fn resample_time(df: &DataFrame, interval_s: f64) -> Result<DataFrame> {
    if !(interval_s.is_finite() && interval_s > 0.0) {
        return Err(ProcessingError::InvalidConfig(format!(
            "resample interval must be positive, got {interval_s}"
        )));
    }

    let times = numeric_values(df, TIME_S)?;
    if let Some(row) = (1..times.len()).find(|&k| !(times[k] >= times[k - 1])) {
        return Err(ProcessingError::UnorderedTime {
            column: TIME_S.to_string(),
            row,
        });
    }

    let mut buckets: Vec<i64> = Vec::with_capacity(times.len());
    for t in &times {
        let bucket = (t / interval_s).floor();
        if !(bucket.abs() < MAX_BUCKET_INDEX) {
            return Err(ProcessingError::InvalidConfig(format!(
                "resample interval {interval_s}s is too small for time_s = {t}"
            )));
        }
        buckets.push(bucket as i64);
    }
    let keep: Vec<bool> = (0..buckets.len())
        .map(|k| k == 0 || buckets[k] != buckets[k - 1])
        .collect();

    let mask = BooleanChunked::from_slice("resample".into(), &keep);
    let resampled = df.filter(&mask)?;

    debug!(
        "Resampled {} rows to {} rows on a {}s grid",
        df.height(),
        resampled.height(),
        interval_s
    );
    if resampled.height() == 0 {
        warn!("Resampling produced an empty table");
    }
    Ok(resampled)
}

/// Replace `column` with the output of `filter`.
///
/// # Errors
///
/// Fails if the column cannot be read as numbers or the filter changes the
/// number of samples.
pub fn apply_filter(df: &mut DataFrame, column: &str, filter: &dyn SignalFilter) -> Result<()> {
    let values = numeric_values(df, column)?;
    let filtered = filter.apply(&values);
    if filtered.len() != values.len() {
        return Err(ProcessingError::LengthMismatch {
            column: column.to_string(),
            expected: values.len(),
            actual: filtered.len(),
        });
    }
    debug!("Applied '{}' filter to '{}'", filter.name(), column);
    set_values(df, column, filtered)
}

/// Add the energy column `E`.
///
/// `E = cumtrapz(U * I / 1000, time_h) + initial_energy`, starting at
/// `initial_energy` on the first row.
pub fn derive_energy(df: &mut DataFrame, initial_energy: f64) -> Result<()> {
    let voltage = numeric_values(df, VOLTAGE)?;
    let current = numeric_values(df, CURRENT)?;
    let hours = numeric_values(df, TIME_H)?;

    let power: Vec<f64> = voltage
        .iter()
        .zip(&current)
        .map(|(u, i)| u * i / POWER_SCALE)
        .collect();
    let energy = offset(cumulative_trapezoid(&power, &hours)?, initial_energy);
    set_values(df, ENERGY, energy)
}

/// Add the column `Q_calc` by integrating current over time.
///
/// `Q_calc = cumtrapz(I, time_h) + initial_charge`. The precomputed `Q`
/// column is left untouched.
pub fn derive_charge(df: &mut DataFrame, initial_charge: f64) -> Result<()> {
    let current = numeric_values(df, CURRENT)?;
    let hours = numeric_values(df, TIME_H)?;

    let charge = offset(cumulative_trapezoid(&current, &hours)?, initial_charge);
    set_values(df, CHARGE_CALC, charge)
}

/// Run `filter` over every per-cell voltage column, in place.
///
/// Returns the names of the filtered columns.
pub fn filter_cell_voltages(df: &mut DataFrame, filter: &dyn SignalFilter) -> Result<Vec<String>> {
    let columns = cell_voltage_columns(df);
    for column in &columns {
        apply_filter(df, column, filter)?;
    }
    Ok(columns)
}

/// Keep rows with `lower <= U <= upper` and re-baseline `Q` and `E`.
///
/// After selection, the first surviving value of `Q` and of `E` is
/// subtracted from the whole column, so both counters start at zero.
///
/// # Errors
///
/// Fails with [`ProcessingError::EmptyResult`] when no row survives, and
/// with a shape error if `U`, `Q` or `E` is missing or unusable.
pub fn extract_voltage_window(df: &DataFrame, lower: f64, upper: f64) -> Result<DataFrame> {
    let voltage = numeric_values(df, VOLTAGE)?;
    let keep: Vec<bool> = voltage.iter().map(|u| *u >= lower && *u <= upper).collect();

    let mask = BooleanChunked::from_slice("window".into(), &keep);
    let mut windowed = df.filter(&mask)?;
    debug!(
        "Voltage window [{}, {}] kept {} of {} rows",
        lower,
        upper,
        windowed.height(),
        df.height()
    );

    if windowed.height() == 0 {
        return Err(ProcessingError::EmptyResult {
            stage: ProcessingStage::VoltageWindow,
        });
    }

    for column in [CHARGE, ENERGY] {
        let rebased = rebase(numeric_values(&windowed, column)?);
        set_values(&mut windowed, column, rebased)?;
    }
    Ok(windowed)
}

/// Subtract the first value from every value.
fn rebase(values: Vec<f64>) -> Vec<f64> {
    match values.first().copied() {
        Some(first) => values.into_iter().map(|v| v - first).collect(),
        None => values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{ClosureFilter, IdentityFilter, MovingAverageFilter};
    use pretty_assertions::assert_eq;

    fn window_table() -> DataFrame {
        df! {
            "U" => [2.5, 3.0, 3.5, 4.0, 4.5],
            "Q" => [10.0, 11.0, 12.5, 14.0, 15.0],
            "E" => [1.0, 2.0, 4.0, 7.0, 9.0],
        }
        .unwrap()
    }

    #[test]
    fn test_resample_picks_first_sample_per_bucket() {
        let df = df! {
            "time_s" => [0.0, 1.0, 4.0, 6.0, 11.0],
            "U" => [3.0, 3.1, 3.2, 3.3, 3.4],
        }
        .unwrap();

        let out = resample_time(&df, 5.0).unwrap();
        assert_eq!(numeric_values(&out, TIME_S).unwrap(), vec![0.0, 6.0, 11.0]);
        assert_eq!(numeric_values(&out, VOLTAGE).unwrap(), vec![3.0, 3.3, 3.4]);
    }

    #[test]
    fn test_resample_drops_empty_buckets() {
        let df = df! { "time_s" => [0i64, 2, 30, 31] }.unwrap();
        let out = resample_time(&df, 5.0).unwrap();
        assert_eq!(numeric_values(&out, TIME_S).unwrap(), vec![0.0, 30.0]);
    }

    #[test]
    fn test_resample_empty_table() {
        let df = df! { "time_s" => Vec::<f64>::new() }.unwrap();
        let out = resample_time(&df, 5.0).unwrap();
        assert_eq!(out.height(), 0);
    }

    #[test]
    fn test_resample_rejects_unordered_time() {
        let df = df! { "time_s" => [0.0, 10.0, 5.0] }.unwrap();
        let err = resample_time(&df, 5.0).unwrap_err();
        assert!(matches!(err, ProcessingError::UnorderedTime { row: 2, .. }));
    }

    #[test]
    fn test_resample_rejects_interval_too_small_for_time_range() {
        let df = df! { "time_s" => [0.0, 1.0, 2.0] }.unwrap();
        let err = resample_time(&df, 1e-310).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");

        let err = resample_time(&df, 1e-17).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_resample_tiny_interval_keeps_distinct_samples() {
        let df = df! { "time_s" => [0.0, 1.0, 2.0] }.unwrap();
        let out = resample_time(&df, 1e-6).unwrap();
        assert_eq!(out.height(), 3);
    }

    #[test]
    fn test_resample_requires_time_seconds() {
        let df = df! { "time_h" => [0.0, 1.0] }.unwrap();
        let err = resample_time(&df, 5.0).unwrap_err();
        assert!(matches!(err, ProcessingError::ColumnNotFound(ref c) if c == TIME_S));
    }

    #[test]
    fn test_apply_filter_replaces_column() {
        let mut df = window_table();
        let filter = MovingAverageFilter::new(3).unwrap();
        apply_filter(&mut df, CHARGE, &filter).unwrap();
        let q = numeric_values(&df, CHARGE).unwrap();
        assert_eq!(q[0], 10.5);
        assert_eq!(q.len(), 5);
    }

    #[test]
    fn test_apply_filter_rejects_length_change() {
        let mut df = window_table();
        let truncating = ClosureFilter::new("truncate", |values: &[f64]| values[1..].to_vec());
        let err = apply_filter(&mut df, VOLTAGE, &truncating).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::LengthMismatch { expected: 5, actual: 4, .. }
        ));
    }

    #[test]
    fn test_derive_energy_constant_power() {
        // 400 V * 25 A = 10 kW for 0.25 h steps
        let mut df = df! {
            "time_h" => [0.0, 0.25, 0.5, 0.75],
            "U" => [400.0; 4],
            "I" => [25.0; 4],
        }
        .unwrap();

        derive_energy(&mut df, 0.0).unwrap();
        let energy = numeric_values(&df, ENERGY).unwrap();
        for (e, t) in energy.iter().zip([0.0, 0.25, 0.5, 0.75]) {
            assert!((e - 10.0 * t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_derive_energy_with_offset_and_single_row() {
        let mut df = df! {
            "time_h" => [0.0],
            "U" => [3.7],
            "I" => [2.0],
        }
        .unwrap();

        derive_energy(&mut df, 5.0).unwrap();
        assert_eq!(numeric_values(&df, ENERGY).unwrap(), vec![5.0]);
    }

    #[test]
    fn test_derive_charge_keeps_precomputed_q() {
        let mut df = df! {
            "time_h" => [0.0, 1.0, 2.0],
            "I" => [-10.0, -10.0, -10.0],
            "Q" => [50.0, 40.0, 30.0],
        }
        .unwrap();

        derive_charge(&mut df, 50.0).unwrap();
        assert_eq!(numeric_values(&df, CHARGE_CALC).unwrap(), vec![50.0, 40.0, 30.0]);
        assert_eq!(numeric_values(&df, CHARGE).unwrap(), vec![50.0, 40.0, 30.0]);
    }

    #[test]
    fn test_filter_cell_voltages_touches_only_cells() {
        let mut df = df! {
            "U" => [7.0, 8.0, 9.0],
            "cell_voltage_01" => [3.5, 4.0, 4.5],
            "cell_voltage_02" => [3.0, 3.0, 3.0],
        }
        .unwrap();
        let add_one = ClosureFilter::new("add_one", |values: &[f64]| {
            values.iter().map(|v| v + 1.0).collect()
        });

        let filtered = filter_cell_voltages(&mut df, &add_one).unwrap();
        assert_eq!(filtered, vec!["cell_voltage_01", "cell_voltage_02"]);
        assert_eq!(numeric_values(&df, "cell_voltage_01").unwrap(), vec![4.5, 5.0, 5.5]);
        assert_eq!(numeric_values(&df, VOLTAGE).unwrap(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_filter_cell_voltages_without_cells() {
        let mut df = window_table();
        assert!(filter_cell_voltages(&mut df, &IdentityFilter).unwrap().is_empty());
    }

    #[test]
    fn test_voltage_window_scenario() {
        let out = extract_voltage_window(&window_table(), 3.0, 4.0).unwrap();
        assert_eq!(numeric_values(&out, VOLTAGE).unwrap(), vec![3.0, 3.5, 4.0]);
        assert_eq!(numeric_values(&out, CHARGE).unwrap(), vec![0.0, 1.5, 3.0]);
        assert_eq!(numeric_values(&out, ENERGY).unwrap(), vec![0.0, 2.0, 5.0]);
    }

    #[test]
    fn test_voltage_window_is_idempotent() {
        let once = extract_voltage_window(&window_table(), 3.0, 4.0).unwrap();
        let twice = extract_voltage_window(&once, 3.0, 4.0).unwrap();
        assert!(once.equals(&twice));
    }

    #[test]
    fn test_voltage_window_unbounded_keeps_everything() {
        let out = extract_voltage_window(&window_table(), 0.0, f64::INFINITY).unwrap();
        assert_eq!(out.height(), 5);
        assert_eq!(numeric_values(&out, CHARGE).unwrap()[0], 0.0);
    }

    #[test]
    fn test_voltage_window_empty_result() {
        let err = extract_voltage_window(&window_table(), 5.0, 6.0).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::EmptyResult {
                stage: ProcessingStage::VoltageWindow
            }
        ));
    }

    #[test]
    fn test_voltage_window_requires_energy() {
        let df = df! { "U" => [3.5], "Q" => [1.0] }.unwrap();
        let err = extract_voltage_window(&df, 3.0, 4.0).unwrap_err();
        assert!(matches!(err, ProcessingError::ColumnNotFound(ref c) if c == ENERGY));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase(vec![2.0, 3.0, 1.0]), vec![0.0, 1.0, -1.0]);
        assert!(rebase(Vec::new()).is_empty());
    }
}
