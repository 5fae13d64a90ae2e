//! Main measurement pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! sequencing resampling, filtering, integration and windowing.

use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result, ResultExt};
use crate::io::{InputFormat, read_table};
use crate::pipeline::progress::{
    ClosureProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
};
use crate::pipeline::stages;
use crate::signal::{IdentityFilter, SignalFilter};
use crate::types::{FilterNames, ProcessingResult, ProcessingSummary};
use crate::utils::{CHARGE, CHARGE_CALC, CURRENT, ENERGY, TIME_H, VOLTAGE, ensure_time_hours};
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// The measurement pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom
/// configuration and filters.
///
/// # Example
///
/// ```rust,ignore
/// use soh_processing::{Pipeline, PipelineConfig, Vehicle};
/// use soh_processing::signal::MedianFilter;
///
/// let (lower, upper) = Vehicle::Tesla.parameters().pack_voltage_window();
/// let config = PipelineConfig::builder()
///     .resample_interval_s(5.0)
///     .voltage_window(lower, upper)
///     .build()?;
///
/// let data = Pipeline::builder()
///     .config(config)
///     .voltage_filter(MedianFilter::new(5)?)
///     .build()?
///     .process(table)?;
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    current_filter: Arc<dyn SignalFilter>,
    voltage_filter: Arc<dyn SignalFilter>,
    charge_filter: Arc<dyn SignalFilter>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

// A configured pipeline can be handed to a worker thread.
static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The configuration this pipeline runs with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a measurement table and return the transformed table.
    ///
    /// # Errors
    ///
    /// Any stage failure aborts the whole transform; see [`ProcessingError`].
    pub fn process(&self, df: DataFrame) -> Result<DataFrame> {
        self.run(df).map(|result| result.data)
    }

    /// Process a measurement table and return it with a summary of the run.
    pub fn run(&self, df: DataFrame) -> Result<ProcessingResult> {
        match self.run_internal(df) {
            Ok(result) => {
                self.report_progress(
                    ProgressUpdate::complete("Pipeline completed successfully")
                        .with_rows(result.data.height()),
                );
                Ok(result)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Load a measurement file and process it.
    ///
    /// The format is taken from the file extension.
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<ProcessingResult> {
        let path = path.as_ref();
        let format = InputFormat::from_path(path)?;
        self.process_file_as(path, format)
    }

    /// Load a measurement file in the given format and process it.
    pub fn process_file_as(
        &self,
        path: impl AsRef<Path>,
        format: InputFormat,
    ) -> Result<ProcessingResult> {
        let path = path.as_ref();
        self.report_progress(ProgressUpdate::new(
            ProcessingStage::Loading,
            0.0,
            format!("Reading {}", path.display()),
        ));
        let df = read_table(path, format)
            .map_err(|e| e.with_context(format!("Failed to load '{}'", path.display())))?;
        self.run(df)
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn stage_started(&self, stage: ProcessingStage, message: &str, rows: usize) {
        self.report_progress(ProgressUpdate::new(stage, 0.0, message).with_rows(rows));
    }

    fn stage_finished(&self, stage: ProcessingStage, message: impl Into<String>, rows: usize) {
        self.report_progress(ProgressUpdate::new(stage, 1.0, message).with_rows(rows));
    }

    fn run_internal(&self, df: DataFrame) -> Result<ProcessingResult> {
        let start_time = Instant::now();
        let mut df = df;

        info!("Starting measurement pipeline...");
        let mut summary = ProcessingSummary::new();
        summary.rows_before = df.height();
        summary.columns_before = df.width();
        summary.filters = FilterNames {
            current: self.current_filter.name().to_string(),
            voltage: self.voltage_filter.name().to_string(),
            charge: self.charge_filter.name().to_string(),
        };
        summary.voltage_window = (self.config.lower_voltage, self.config.upper_voltage);

        // Step 1: Resample onto a uniform grid (optional)
        if let Some(interval) = self.config.resample_interval_s {
            self.stage_started(ProcessingStage::Resampling, "Resampling...", df.height());
            info!("Step 1: Resampling onto a {}s grid...", interval);

            df = stages::resample_time(&df, interval).context("During resampling")?;
            summary.rows_after_resample = Some(df.height());
            summary.add_action(format!(
                "Resampled {} rows to {} rows on a {}s grid",
                summary.rows_before,
                df.height(),
                interval
            ));
            if df.height() == 0 {
                summary.add_warning("Resampling produced an empty table");
            }

            self.stage_finished(ProcessingStage::Resampling, "Resampling complete", df.height());
        } else {
            info!("Step 1: Skipping resampling (disabled)");
        }

        // Step 2: Filter I, U and Q independently
        self.stage_started(ProcessingStage::Filtering, "Filtering signals...", df.height());
        info!("Step 2: Filtering signals...");
        for (column, filter) in [
            (CURRENT, &self.current_filter),
            (VOLTAGE, &self.voltage_filter),
            (CHARGE, &self.charge_filter),
        ] {
            stages::apply_filter(&mut df, column, filter.as_ref())
                .context(format!("While filtering '{}'", column))?;
            summary.add_action(format!("Applied '{}' filter to '{}'", filter.name(), column));
        }
        self.stage_finished(ProcessingStage::Filtering, "Filtering complete", df.height());

        // Step 3: Integrate power into energy (and current into charge if asked)
        self.stage_started(ProcessingStage::EnergyDerivation, "Deriving energy...", df.height());
        info!("Step 3: Deriving energy from power...");
        if ensure_time_hours(&mut df)? {
            debug!("Derived '{}' from seconds", TIME_H);
            summary.add_derived_column(TIME_H);
        }
        stages::derive_energy(&mut df, self.config.initial_energy)
            .context("While deriving energy")?;
        summary.add_derived_column(ENERGY);
        self.stage_finished(
            ProcessingStage::EnergyDerivation,
            "Energy derivation complete",
            df.height(),
        );

        if self.config.derive_charge {
            self.stage_started(ProcessingStage::ChargeDerivation, "Deriving charge...", df.height());
            info!("Step 3b: Deriving charge from current...");
            stages::derive_charge(&mut df, self.config.initial_charge)
                .context("While deriving charge")?;
            summary.add_derived_column(CHARGE_CALC);
            self.stage_finished(
                ProcessingStage::ChargeDerivation,
                "Charge derivation complete",
                df.height(),
            );
        }

        // Step 4: Filter per-cell voltages (optional)
        if self.config.filter_cell_voltages {
            self.stage_started(
                ProcessingStage::CellVoltageFiltering,
                "Filtering cell voltages...",
                df.height(),
            );
            info!("Step 4: Filtering cell voltages...");
            let cells = stages::filter_cell_voltages(&mut df, self.voltage_filter.as_ref())
                .context("While filtering cell voltages")?;
            if cells.is_empty() {
                summary.add_warning("No cell voltage columns found");
            } else {
                summary.add_action(format!(
                    "Applied '{}' filter to {} cell voltage columns",
                    self.voltage_filter.name(),
                    cells.len()
                ));
            }
            summary.filtered_cell_voltage_columns = cells;
            self.stage_finished(
                ProcessingStage::CellVoltageFiltering,
                "Cell voltage filtering complete",
                df.height(),
            );
        } else {
            info!("Step 4: Skipping cell voltage filtering (disabled)");
        }

        // Step 5: Restrict to the voltage window and re-baseline Q and E
        let (lower, upper) = self.config.voltage_bounds();
        self.stage_started(
            ProcessingStage::VoltageWindow,
            "Extracting voltage window...",
            df.height(),
        );
        info!("Step 5: Extracting voltage window [{}, {}]...", lower, upper);
        let rows_before_window = df.height();
        let df = stages::extract_voltage_window(&df, lower, upper)?;
        summary.add_action(format!(
            "Kept {} of {} rows within [{}, {}] V",
            df.height(),
            rows_before_window,
            lower,
            upper
        ));
        self.stage_finished(
            ProcessingStage::VoltageWindow,
            "Voltage window extracted",
            df.height(),
        );

        summary.rows_after = df.height();
        summary.columns_after = df.width();
        summary.duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "Pipeline finished: {} -> {} rows in {}ms",
            summary.rows_before, summary.rows_after, summary.duration_ms
        );

        Ok(ProcessingResult { data: df, summary })
    }
}

/// Builder for creating a [`Pipeline`] with custom configuration.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    current_filter: Option<Arc<dyn SignalFilter>>,
    voltage_filter: Option<Arc<dyn SignalFilter>>,
    charge_filter: Option<Arc<dyn SignalFilter>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the filter applied to the current column `I`.
    pub fn current_filter(mut self, filter: impl SignalFilter + 'static) -> Self {
        self.current_filter = Some(Arc::new(filter));
        self
    }

    /// Set the filter applied to the voltage column `U` and, when enabled,
    /// to every per-cell voltage column.
    pub fn voltage_filter(mut self, filter: impl SignalFilter + 'static) -> Self {
        self.voltage_filter = Some(Arc::new(filter));
        self
    }

    /// Set the filter applied to the charge column `Q`.
    pub fn charge_filter(mut self, filter: impl SignalFilter + 'static) -> Self {
        self.charge_filter = Some(Arc::new(filter));
        self
    }

    /// Set a shared filter for the current column.
    pub fn current_filter_arc(mut self, filter: Arc<dyn SignalFilter>) -> Self {
        self.current_filter = Some(filter);
        self
    }

    /// Set a shared filter for the voltage columns.
    pub fn voltage_filter_arc(mut self, filter: Arc<dyn SignalFilter>) -> Self {
        self.voltage_filter = Some(filter);
        self
    }

    /// Set a shared filter for the charge column.
    pub fn charge_filter_arc(mut self, filter: Arc<dyn SignalFilter>) -> Self {
        self.charge_filter = Some(filter);
        self
    }

    /// Set a progress reporter.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback using a closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Unset filters default to [`IdentityFilter`].
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| ProcessingError::InvalidConfig(e.to_string()))?;

        let identity = || Arc::new(IdentityFilter) as Arc<dyn SignalFilter>;

        Ok(Pipeline {
            config,
            current_filter: self.current_filter.unwrap_or_else(identity),
            voltage_filter: self.voltage_filter.unwrap_or_else(identity),
            charge_filter: self.charge_filter.unwrap_or_else(identity),
            progress_reporter: self.progress_reporter,
        })
    }
}
