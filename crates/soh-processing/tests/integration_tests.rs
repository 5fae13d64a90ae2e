//! Integration tests for the measurement pipeline.
//!
//! These tests verify end-to-end behavior of the pipeline on recorded drive
//! cycles and generated measurement tables.

use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use soh_processing::{
    ClosureFilter, InputFormat, MedianFilter, MovingAverageFilter, Pipeline, PipelineConfig,
    ProcessingError, ProcessingStage, ProgressUpdate, Vehicle, read_table, write_table,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

const TOLERANCE: f64 = 1e-9;

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn values(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length differs");
    for (k, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < TOLERANCE, "row {k}: {a} != {e}");
    }
}

fn pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::builder().config(config).build().unwrap()
}

fn window(lower: f64, upper: f64) -> PipelineConfig {
    PipelineConfig::builder()
        .voltage_window(lower, upper)
        .build()
        .unwrap()
}

/// A time-ordered table with random sample spacing and a random voltage walk.
fn random_table(rng: &mut StdRng, rows: usize) -> DataFrame {
    let mut time_s = Vec::with_capacity(rows);
    let mut current = Vec::with_capacity(rows);
    let mut voltage = Vec::with_capacity(rows);
    let mut charge = Vec::with_capacity(rows);

    let (mut t, mut u, mut q) = (0.0_f64, 370.0_f64, 20.0_f64);
    for _ in 0..rows {
        time_s.push(t);
        current.push(rng.gen_range(-60.0..40.0));
        voltage.push(u);
        charge.push(q);
        t += rng.gen_range(0.1..3.0);
        u = (u + rng.gen_range(-4.0..4.0)).clamp(330.0, 410.0);
        q += rng.gen_range(-0.05..0.05);
    }

    df! {
        "time_s" => time_s,
        "I" => current,
        "U" => voltage,
        "Q" => charge,
    }
    .unwrap()
}

// ============================================================================
// Drive Cycle Fixture
// ============================================================================

#[test]
fn test_drive_cycle_tesla_window() {
    let df = load_csv("drive_cycle.csv");
    let (lower, upper) = Vehicle::Tesla.parameters().pack_voltage_window();

    let result = pipeline(window(lower, upper)).run(df).unwrap();
    let out = &result.data;

    // 392, 395 and 391 V fall outside [340, 390]
    assert_eq!(out.height(), 9);
    assert_eq!(result.summary.rows_before, 12);
    assert_eq!(result.summary.rows_after, 9);
    assert_eq!(result.summary.voltage_window, (340.0, Some(390.0)));

    let voltage = values(out, "U");
    assert!(voltage.iter().all(|u| (lower..=upper).contains(u)));

    let charge = values(out, "Q");
    assert_eq!(charge[0], 0.0);
    assert!((charge[8] - 0.40).abs() < 1e-6);

    let energy = values(out, "E");
    assert_eq!(energy[0], 0.0);
    // Discharge throughout: energy only decreases
    assert!(energy.windows(2).all(|w| w[1] < w[0]));
}

#[test]
fn test_drive_cycle_energy_matches_hand_integration() {
    let df = load_csv("drive_cycle.csv");
    let out = pipeline(PipelineConfig::default()).process(df).unwrap();

    let u = values(&out, "U");
    let i = values(&out, "I");
    let h = values(&out, "time_h");
    let mut expected = vec![0.0];
    for k in 1..u.len() {
        let p0 = u[k - 1] * i[k - 1] / 1000.0;
        let p1 = u[k] * i[k] / 1000.0;
        expected.push(expected[k - 1] + 0.5 * (p0 + p1) * (h[k] - h[k - 1]));
    }

    assert_close(&values(&out, "E"), &expected);
}

#[test]
fn test_drive_cycle_cell_voltage_filtering() {
    let df = load_csv("drive_cycle.csv");
    let raw_cells = values(&df, "cell_voltage_1");

    let config = PipelineConfig::builder()
        .filter_cell_voltages(true)
        .build()
        .unwrap();
    let result = Pipeline::builder()
        .config(config)
        .voltage_filter(MovingAverageFilter::new(3).unwrap())
        .build()
        .unwrap()
        .run(df)
        .unwrap();

    assert_eq!(
        result.summary.filtered_cell_voltage_columns,
        vec!["cell_voltage_1", "cell_voltage_2"]
    );
    let filtered = values(&result.data, "cell_voltage_1");
    let expected_first = (raw_cells[0] + raw_cells[1]) / 2.0;
    let expected_second = (raw_cells[0] + raw_cells[1] + raw_cells[2]) / 3.0;
    assert!((filtered[0] - expected_first).abs() < TOLERANCE);
    assert!((filtered[1] - expected_second).abs() < TOLERANCE);
}

#[test]
fn test_cell_voltages_untouched_when_disabled() {
    let df = load_csv("drive_cycle.csv");
    let raw_cells = values(&df, "cell_voltage_2");

    let out = Pipeline::builder()
        .voltage_filter(MedianFilter::new(5).unwrap())
        .build()
        .unwrap()
        .process(df)
        .unwrap();

    assert_close(&values(&out, "cell_voltage_2"), &raw_cells);
}

#[test]
fn test_drive_cycle_derive_charge() {
    let df = load_csv("drive_cycle.csv");
    let raw_charge = values(&df, "Q");
    let config = PipelineConfig::builder()
        .derive_charge(true)
        .initial_charge(10.0)
        .build()
        .unwrap();

    let result = pipeline(config).run(df).unwrap();
    let q_calc = values(&result.data, "Q_calc");

    assert_eq!(q_calc[0], 10.0);
    assert!(q_calc.windows(2).all(|w| w[1] <= w[0]));
    assert!(result.summary.derived_columns.contains(&"Q_calc".to_string()));

    // Q is only rebased, never replaced
    let rebased: Vec<f64> = raw_charge.iter().map(|q| q - raw_charge[0]).collect();
    assert_close(&values(&result.data, "Q"), &rebased);
}

// ============================================================================
// Resampling
// ============================================================================

#[test]
fn test_resample_irregular_timestamps() {
    let df = load_csv("irregular_timestamps.csv");
    let config = PipelineConfig::builder()
        .resample_interval_s(2.0)
        .build()
        .unwrap();

    let result = pipeline(config).run(df).unwrap();

    // First sample of buckets 0, 1, 2 and 3
    assert_close(&values(&result.data, "time_s"), &[0.0, 2.0, 4.0, 7.2]);
    assert_close(&values(&result.data, "I"), &[1.0, 1.4, 1.7, 2.0]);
    assert_eq!(result.summary.rows_after_resample, Some(4));
    assert_eq!(result.summary.rows_after, 4);
}

#[test]
fn test_resample_rejects_unordered_time() {
    let df = load_csv("unordered_time.csv");
    let config = PipelineConfig::builder()
        .resample_interval_s(1.0)
        .build()
        .unwrap();

    let err = pipeline(config).process(df).unwrap_err();
    assert_eq!(err.error_code(), "UNORDERED_TIME");
    assert!(err.is_shape_error());
}

// ============================================================================
// Voltage Window Scenarios
// ============================================================================

#[test]
fn test_window_rebases_charge_and_energy() {
    let df = df! {
        "time_s" => [0.0, 3600.0, 7200.0, 10800.0],
        "I" => [1.0, 1.0, 1.0, 1.0],
        "U" => [2.9, 3.2, 3.5, 4.3],
        "Q" => [0.0, 1.0, 2.0, 3.0],
    }
    .unwrap();

    let out = pipeline(window(3.0, 4.2)).process(df).unwrap();

    assert_close(&values(&out, "U"), &[3.2, 3.5]);
    assert_close(&values(&out, "Q"), &[0.0, 1.0]);
    // Trapezoid of U*I/1000 between the surviving rows: (3.2 + 3.5) / 2 / 1000
    assert_close(&values(&out, "E"), &[0.0, 0.00335]);
}

#[test]
fn test_identity_filters_only_select_rows() {
    let df = load_csv("drive_cycle.csv");
    let (lower, upper) = Vehicle::Tesla.parameters().pack_voltage_window();

    let out = pipeline(window(lower, upper)).process(df.clone()).unwrap();

    // The Tesla window keeps the first 9 rows of the drive cycle
    let kept = out.height();
    assert_eq!(kept, 9);
    assert_close(&values(&out, "I"), &values(&df, "I")[..kept]);
    assert_close(&values(&out, "U"), &values(&df, "U")[..kept]);

    let raw_charge = values(&df, "Q");
    let rebased: Vec<f64> = raw_charge[..kept]
        .iter()
        .map(|q| q - raw_charge[0])
        .collect();
    assert_close(&values(&out, "Q"), &rebased);
}

#[test]
fn test_window_bounds_are_inclusive() {
    let df = df! {
        "time_s" => [0.0, 1.0, 2.0, 3.0],
        "I" => [1.0, 1.0, 1.0, 1.0],
        "U" => [2.999, 3.0, 4.2, 4.2001],
        "Q" => [0.0, 0.1, 0.2, 0.3],
    }
    .unwrap();

    let out = pipeline(window(3.0, 4.2)).process(df).unwrap();
    assert_close(&values(&out, "U"), &[3.0, 4.2]);
}

#[test]
fn test_empty_window_fails() {
    let df = load_csv("drive_cycle.csv");
    let err = pipeline(window(500.0, 600.0)).process(df).unwrap_err();

    assert!(err.is_empty_result());
    assert!(matches!(
        err,
        ProcessingError::EmptyResult {
            stage: ProcessingStage::VoltageWindow
        }
    ));
}

#[test]
fn test_window_output_is_idempotent() {
    let df = load_csv("drive_cycle.csv");
    let p = pipeline(window(360.0, 385.0));

    let once = p.process(df).unwrap();
    let twice = p.process(once.clone()).unwrap();

    assert_eq!(once.height(), twice.height());
    assert_close(&values(&twice, "Q"), &values(&once, "Q"));
    assert_close(&values(&twice, "U"), &values(&once, "U"));
    assert_close(&values(&twice, "E"), &values(&once, "E"));
}

// ============================================================================
// Properties on Generated Tables
// ============================================================================

#[test]
fn test_random_tables_rebase_law() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        let rows = rng.gen_range(2..200);
        let df = random_table(&mut rng, rows);

        // Default window keeps every row, giving the reference integrals
        let full = pipeline(PipelineConfig::default())
            .process(df.clone())
            .unwrap();
        assert_eq!(full.height(), rows);

        let windowed = match pipeline(window(360.0, 380.0)).process(df) {
            Ok(out) => out,
            Err(err) => {
                assert!(err.is_empty_result());
                continue;
            }
        };
        assert!(windowed.height() <= rows);

        let full_time = values(&full, "time_s");
        let full_q = values(&full, "Q");
        let full_e = values(&full, "E");
        let indices: Vec<usize> = values(&windowed, "time_s")
            .iter()
            .map(|t| full_time.iter().position(|ft| ft == t).unwrap())
            .collect();

        let first = indices[0];
        let expected_q: Vec<f64> = indices.iter().map(|&k| full_q[k] - full_q[first]).collect();
        let expected_e: Vec<f64> = indices.iter().map(|&k| full_e[k] - full_e[first]).collect();
        assert_close(&values(&windowed, "Q"), &expected_q);
        assert_close(&values(&windowed, "E"), &expected_e);
        assert!(
            values(&windowed, "U")
                .iter()
                .all(|u| (360.0..=380.0).contains(u))
        );
    }
}

#[test]
fn test_random_tables_keep_columns_aligned() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..10 {
        let rows = rng.gen_range(1..150);
        let df = random_table(&mut rng, rows);
        let config = PipelineConfig::builder()
            .resample_interval_s(rng.gen_range(0.5..5.0))
            .derive_charge(true)
            .build()
            .unwrap();

        let result = Pipeline::builder()
            .config(config)
            .current_filter(MedianFilter::new(3).unwrap())
            .voltage_filter(MovingAverageFilter::new(5).unwrap())
            .build()
            .unwrap()
            .run(df)
            .unwrap();

        let out = &result.data;
        assert!(out.height() <= rows);
        for column in out.get_column_names() {
            assert_eq!(out.column(column.as_str()).unwrap().len(), out.height());
        }
        let times = values(out, "time_s");
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_constant_power_energy_is_linear() {
    let df = df! {
        "time_s" => [0.0, 1800.0, 3600.0, 5400.0, 7200.0],
        "I" => [10.0, 10.0, 10.0, 10.0, 10.0],
        "U" => [400.0, 400.0, 400.0, 400.0, 400.0],
        "Q" => [0.0, 5.0, 10.0, 15.0, 20.0],
    }
    .unwrap();

    // 4 units of power for 2 h
    let out = pipeline(PipelineConfig::default()).process(df).unwrap();
    assert_close(&values(&out, "E"), &[0.0, 2.0, 4.0, 6.0, 8.0]);
}

// ============================================================================
// Filters and Progress
// ============================================================================

#[test]
fn test_custom_filter_length_mismatch() {
    let df = load_csv("drive_cycle.csv");
    let err = Pipeline::builder()
        .charge_filter(ClosureFilter::new("decimate", |v: &[f64]| {
            v.iter().step_by(2).copied().collect()
        }))
        .build()
        .unwrap()
        .process(df)
        .unwrap_err();

    assert_eq!(err.error_code(), "LENGTH_MISMATCH");
    assert!(err.to_string().contains("'Q'"));
}

#[test]
fn test_progress_reports_every_stage_in_order() {
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);

    let config = PipelineConfig::builder()
        .resample_interval_s(10.0)
        .filter_cell_voltages(true)
        .build()
        .unwrap();
    Pipeline::builder()
        .config(config)
        .on_progress(move |update| sink.lock().unwrap().push(update))
        .build()
        .unwrap()
        .run(load_csv("drive_cycle.csv"))
        .unwrap();

    let updates = updates.lock().unwrap();
    let finished: Vec<ProcessingStage> = updates
        .iter()
        .filter(|u| u.stage_progress >= 1.0)
        .map(|u| u.stage)
        .collect();
    assert_eq!(
        finished,
        vec![
            ProcessingStage::Resampling,
            ProcessingStage::Filtering,
            ProcessingStage::EnergyDerivation,
            ProcessingStage::CellVoltageFiltering,
            ProcessingStage::VoltageWindow,
            ProcessingStage::Complete,
        ]
    );
    assert!(updates.windows(2).all(|w| w[1].progress >= w[0].progress));
}

#[test]
fn test_progress_reports_failure() {
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);

    let _ = Pipeline::builder()
        .config(window(500.0, 600.0))
        .on_progress(move |update| sink.lock().unwrap().push(update))
        .build()
        .unwrap()
        .run(load_csv("drive_cycle.csv"));

    let last = updates.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.stage, ProcessingStage::Failed);
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn test_process_file_in_every_format() {
    let df = load_csv("drive_cycle.csv");
    let reference = pipeline(PipelineConfig::default())
        .process(df.clone())
        .unwrap();
    let dir = std::env::temp_dir().join(format!("soh_processing_it_{}", std::process::id()));

    for format in [
        InputFormat::Feather,
        InputFormat::Json,
        InputFormat::Csv,
        InputFormat::Parquet,
    ] {
        let path = dir.join(format!("drive_cycle.{}", format.extension()));
        let mut table = df.clone();
        write_table(&mut table, &path, format).unwrap();

        let result = pipeline(PipelineConfig::default())
            .process_file(&path)
            .unwrap();
        assert_eq!(result.data.height(), reference.height(), "{format:?}");
        assert_close(&values(&result.data, "E"), &values(&reference, "E"));
    }

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_process_missing_file() {
    let err = pipeline(PipelineConfig::default())
        .process_file(fixtures_path().join("does_not_exist.feather"))
        .unwrap_err();
    assert_eq!(err.error_code(), "IO_ERROR");
    assert!(err.to_string().contains("Failed to load"));
}

#[test]
fn test_unsupported_extension() {
    let err = pipeline(PipelineConfig::default())
        .process_file("drive.xlsx")
        .unwrap_err();
    assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
}

#[test]
fn test_read_table_matches_csv_loader() {
    let path = fixtures_path().join("drive_cycle.csv");
    let df = read_table(&path, InputFormat::Csv).unwrap();
    assert!(df.equals(&load_csv("drive_cycle.csv")));
}

// ============================================================================
// Shape Errors
// ============================================================================

#[test]
fn test_missing_voltage_column() {
    let df = df! {
        "time_s" => [0.0, 1.0],
        "I" => [1.0, 1.0],
        "Q" => [0.0, 0.1],
    }
    .unwrap();

    let err = pipeline(PipelineConfig::default()).process(df).unwrap_err();
    assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    assert!(err.is_shape_error());
}

#[test]
fn test_null_values_are_rejected() {
    let df = df! {
        "time_s" => [0.0, 1.0, 2.0],
        "I" => [Some(1.0), None, Some(1.0)],
        "U" => [3.6, 3.7, 3.8],
        "Q" => [0.0, 0.1, 0.2],
    }
    .unwrap();

    let err = pipeline(PipelineConfig::default()).process(df).unwrap_err();
    assert_eq!(err.error_code(), "NULL_VALUES");
}

#[test]
fn test_non_numeric_voltage_is_rejected() {
    let df = df! {
        "time_s" => [0.0, 1.0],
        "I" => [1.0, 1.0],
        "U" => ["high", "low"],
        "Q" => [0.0, 0.1],
    }
    .unwrap();

    let err = pipeline(PipelineConfig::default()).process(df).unwrap_err();
    assert_eq!(err.error_code(), "NON_NUMERIC_COLUMN");
}
