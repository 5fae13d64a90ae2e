//! Reading and writing measurement tables.
//!
//! All formats load into the same polars `DataFrame`; the pipeline does not
//! care where a table came from.

use crate::error::{ProcessingError, Result};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Supported storage formats for measurement tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Arrow IPC file (Feather v2), columnar binary
    Feather,
    /// JSON array of row records
    Json,
    /// Comma-separated values with a header row
    Csv,
    /// Apache Parquet
    Parquet,
}

impl InputFormat {
    /// Pick the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::UnsupportedFormat`] for unknown or missing
    /// extensions.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "feather" | "arrow" | "ipc" => Ok(Self::Feather),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "parquet" | "pq" => Ok(Self::Parquet),
            "" => Err(ProcessingError::UnsupportedFormat(format!(
                "'{}' has no file extension",
                path.display()
            ))),
            other => Err(ProcessingError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    /// Canonical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Feather => "feather",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

/// Load a measurement table from `path`.
pub fn read_table(path: &Path, format: InputFormat) -> Result<DataFrame> {
    debug!("Reading {:?} table from {}", format, path.display());

    let df = match format {
        InputFormat::Feather => IpcReader::new(File::open(path)?).finish()?,
        InputFormat::Json => JsonReader::new(File::open(path)?).finish()?,
        InputFormat::Parquet => ParquetReader::new(File::open(path)?).finish()?,
        InputFormat::Csv => {
            if !path.exists() {
                return Err(ProcessingError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                )));
            }
            CsvReadOptions::default()
                .with_has_header(true)
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()?
        }
    };

    info!("Loaded table: {:?}", df.shape());
    Ok(df)
}

/// Write a measurement table to `path`.
pub fn write_table(df: &mut DataFrame, path: &Path, format: InputFormat) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;

    match format {
        InputFormat::Feather => IpcWriter::new(&mut file).finish(df)?,
        InputFormat::Json => JsonWriter::new(&mut file)
            .with_json_format(JsonFormat::Json)
            .finish(df)?,
        InputFormat::Csv => CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(df)?,
        InputFormat::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
    }

    info!("Table saved: {}", path.display());
    Ok(())
}
