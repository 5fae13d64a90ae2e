//! Battery Measurement Preparation Library
//!
//! Prepares time-series battery measurements (current, voltage, charge,
//! energy) for state-of-health analysis, built with Rust and Polars.
//!
//! # Overview
//!
//! A [`Pipeline`] takes one measurement table and runs, strictly in order:
//!
//! 1. **Resampling** (optional): first sample per bucket of a uniform time grid
//! 2. **Filtering**: pluggable [`signal::SignalFilter`]s on `I`, `U` and `Q`
//! 3. **Energy derivation**: trapezoidal integral of `U * I / 1000` over `time_h` into `E`
//! 4. **Cell voltage filtering** (optional): the voltage filter on every `*cell_voltage*` column
//! 5. **Voltage windowing**: keep rows with `U` inside the window, re-baseline `Q` and `E` to zero
//!
//! Integrating current into `Q_calc` is available but off by default; the
//! precomputed `Q` column stays authoritative.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use soh_processing::{InputFormat, Pipeline, PipelineConfig, Vehicle, read_table};
//! use soh_processing::signal::MovingAverageFilter;
//! use std::path::Path;
//!
//! let df = read_table(Path::new("drive.feather"), InputFormat::Feather)?;
//!
//! let (lower, upper) = Vehicle::Vw.parameters().pack_voltage_window();
//! let config = PipelineConfig::builder()
//!     .resample_interval_s(5.0)
//!     .voltage_window(lower, upper)
//!     .filter_cell_voltages(true)
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .voltage_filter(MovingAverageFilter::new(9)?)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(df)?;
//!
//! println!("Kept {} of {} rows", result.summary.rows_after, result.summary.rows_before);
//! ```
//!
//! # Errors
//!
//! Every failure aborts the transform and is returned as a
//! [`ProcessingError`]. A window that leaves no rows fails with
//! [`ProcessingError::EmptyResult`] rather than returning an empty table.

pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod signal;
pub mod types;
pub mod utils;
pub mod vehicle;

// Re-exports for convenient access
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{ProcessingError, ResultExt};
pub use io::{InputFormat, read_table, write_table};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
pub use signal::{
    ClosureFilter, IdentityFilter, MedianFilter, MovingAverageFilter, SignalFilter,
    cumulative_trapezoid,
};
pub use types::{FilterNames, ProcessingResult, ProcessingSummary};
pub use vehicle::{Vehicle, VehicleParameters};
