//! CLI entry point for the measurement pipeline.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use soh_processing::{
    IdentityFilter, InputFormat, MedianFilter, MovingAverageFilter, Pipeline, PipelineConfig,
    ProcessingResult, SignalFilter, Vehicle, write_table,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// CLI-compatible table format enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    /// Arrow IPC / Feather file
    Feather,
    /// JSON array of records
    Json,
    /// CSV with header row
    Csv,
    /// Apache Parquet
    Parquet,
}

impl From<CliFormat> for InputFormat {
    fn from(cli: CliFormat) -> Self {
        match cli {
            CliFormat::Feather => InputFormat::Feather,
            CliFormat::Json => InputFormat::Json,
            CliFormat::Csv => InputFormat::Csv,
            CliFormat::Parquet => InputFormat::Parquet,
        }
    }
}

/// CLI-compatible vehicle enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliVehicle {
    Tesla,
    Vw,
    Cupra,
}

impl From<CliVehicle> for Vehicle {
    fn from(cli: CliVehicle) -> Self {
        match cli {
            CliVehicle::Tesla => Vehicle::Tesla,
            CliVehicle::Vw => Vehicle::Vw,
            CliVehicle::Cupra => Vehicle::Cupra,
        }
    }
}

/// Filter selection parsed from `none`, `mean:<n>` or `median:<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterSpec {
    Identity,
    MovingAverage(usize),
    Median(usize),
}

impl FilterSpec {
    fn build(self) -> Result<Arc<dyn SignalFilter>> {
        Ok(match self {
            FilterSpec::Identity => Arc::new(IdentityFilter),
            FilterSpec::MovingAverage(window) => Arc::new(MovingAverageFilter::new(window)?),
            FilterSpec::Median(window) => Arc::new(MedianFilter::new(window)?),
        })
    }
}

fn parse_filter_spec(spec: &str) -> std::result::Result<FilterSpec, String> {
    let spec = spec.trim().to_ascii_lowercase();
    if spec == "none" || spec == "identity" {
        return Ok(FilterSpec::Identity);
    }

    let (kind, window) = spec
        .split_once(':')
        .ok_or_else(|| format!("expected 'none', 'mean:<n>' or 'median:<n>', got '{spec}'"))?;
    let window: usize = window
        .parse()
        .map_err(|_| format!("invalid window size '{window}'"))?;
    if window == 0 {
        return Err("window size must be at least 1".to_string());
    }

    match kind {
        "mean" | "moving_average" => Ok(FilterSpec::MovingAverage(window)),
        "median" => Ok(FilterSpec::Median(window)),
        other => Err(format!("unknown filter '{other}'")),
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Battery measurement preparation for state-of-health analysis",
    long_about = "Resamples, filters and integrates battery measurements, then restricts \
                  them to a voltage window with re-baselined charge and energy counters.\n\n\
                  EXAMPLES:\n  \
                  # Default processing, summary only\n  \
                  soh-processing -i drive.feather\n\n  \
                  # 5 s grid, Tesla pack window, median-filtered voltage\n  \
                  soh-processing -i drive.feather --resample 5 --vehicle tesla \\\n    \
                  --filter-voltage median:5 -o out/drive.parquet\n\n  \
                  # Machine-readable summary\n  \
                  soh-processing -i drive.json --json | jq .rows_after"
)]
struct Args {
    /// Path to the measurement table
    #[arg(short, long)]
    input: PathBuf,

    /// Input format (default: from the file extension)
    #[arg(long, value_enum)]
    format: Option<CliFormat>,

    /// Where to write the processed table (format from the file extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Resample onto a uniform grid of this many seconds
    #[arg(long)]
    resample: Option<f64>,

    /// Inclusive lower voltage bound (V)
    #[arg(long)]
    lower_voltage: Option<f64>,

    /// Inclusive upper voltage bound (V)
    #[arg(long)]
    upper_voltage: Option<f64>,

    /// Take the voltage window from a vehicle's pack limits
    ///
    /// Explicit --lower-voltage/--upper-voltage take precedence
    #[arg(long, value_enum)]
    vehicle: Option<CliVehicle>,

    /// Filter for the current column: none, mean:<n> or median:<n>
    #[arg(long, default_value = "none", value_parser = parse_filter_spec)]
    filter_current: FilterSpec,

    /// Filter for the voltage and cell voltage columns: none, mean:<n> or median:<n>
    #[arg(long, default_value = "none", value_parser = parse_filter_spec)]
    filter_voltage: FilterSpec,

    /// Filter for the charge column: none, mean:<n> or median:<n>
    #[arg(long, default_value = "none", value_parser = parse_filter_spec)]
    filter_charge: FilterSpec,

    /// Also run the voltage filter over every cell voltage column
    #[arg(long)]
    filter_cell_voltages: bool,

    /// Integrate current into an additional Q_calc column
    #[arg(long)]
    derive_charge: bool,

    /// Offset added to Q_calc (Ah)
    #[arg(long, default_value = "0.0")]
    initial_charge: f64,

    /// Offset added to E before windowing
    #[arg(long, default_value = "0.0")]
    initial_energy: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output the run summary as JSON to stdout
    ///
    /// Disables all logging so stdout only carries the JSON document.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .filter_cell_voltages(args.filter_cell_voltages)
        .derive_charge(args.derive_charge)
        .initial_charge(args.initial_charge)
        .initial_energy(args.initial_energy);

    if let Some(interval) = args.resample {
        builder = builder.resample_interval_s(interval);
    }

    if let Some(vehicle) = args.vehicle {
        let vehicle = Vehicle::from(vehicle);
        let (lower, upper) = vehicle.parameters().pack_voltage_window();
        info!("Using {} pack window [{}, {}] V", vehicle.name(), lower, upper);
        builder = builder.voltage_window(lower, upper);
    }
    if let Some(lower) = args.lower_voltage {
        builder = builder.lower_voltage(lower);
    }
    if let Some(upper) = args.upper_voltage {
        builder = builder.upper_voltage(upper);
    }

    Ok(builder.build()?)
}

fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    debug!(
        "Filters: current={:?} voltage={:?} charge={:?}",
        args.filter_current, args.filter_voltage, args.filter_charge
    );

    let mut builder = Pipeline::builder()
        .config(config)
        .current_filter_arc(args.filter_current.build()?)
        .voltage_filter_arc(args.filter_voltage.build()?)
        .charge_filter_arc(args.filter_charge.build()?);

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            if update.stage_progress >= 1.0 {
                info!(
                    "[{:.0}%] {}: {}",
                    update.progress * 100.0,
                    update.stage.display_name(),
                    update.message
                );
            }
        });
    }

    Ok(builder.build()?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }

    let config = build_config(&args)?;
    let pipeline = build_pipeline(&args, config)?;

    info!("Processing {}", args.input.display());
    let mut result = match args.format {
        Some(format) => pipeline.process_file_as(&args.input, format.into())?,
        None => pipeline.process_file(&args.input)?,
    };

    if let Some(output) = &args.output {
        let format = InputFormat::from_path(output)?;
        write_table(&mut result.data, output, format)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.summary)?);
    } else {
        print_summary(&args, &result);
    }

    Ok(())
}

/// Print a human-readable run summary.
///
/// Uses `println!` on purpose: this is the command's result, not a log line.
fn print_summary(args: &Args, result: &ProcessingResult) {
    let summary = &result.summary;

    println!("\n{}", "=".repeat(60));
    println!("MEASUREMENT PIPELINE SUMMARY");
    println!("{}", "=".repeat(60));
    println!("  File:            {}", args.input.display());
    println!("  Rows in:         {}", summary.rows_before);
    if let Some(rows) = summary.rows_after_resample {
        println!("  Rows resampled:  {}", rows);
    }
    println!(
        "  Rows out:        {} ({:.1}% removed)",
        summary.rows_after,
        summary.rows_removed_percentage()
    );
    match summary.voltage_window {
        (lower, Some(upper)) => println!("  Voltage window:  [{}, {}] V", lower, upper),
        (lower, None) => println!("  Voltage window:  [{}, inf) V", lower),
    }
    println!(
        "  Filters:         I={} U={} Q={}",
        summary.filters.current, summary.filters.voltage, summary.filters.charge
    );
    println!("  Derived columns: {}", summary.derived_columns.join(", "));
    println!("  Duration:        {}ms", summary.duration_ms);

    if !summary.warnings.is_empty() {
        println!("\nWARNINGS");
        for warning in &summary.warnings {
            println!("  - {}", warning);
        }
    }

    if let Some(output) = &args.output {
        println!("\nOutput written to {}", output.display());
    }
    println!("{}", "=".repeat(60));
}
