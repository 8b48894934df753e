#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result sink for geo-enrich.
//!
//! Persists an enriched [`Dataset`] once the batch loop has exited,
//! whether it completed, was cancelled, or failed. Output columns are the
//! input columns followed by the enrichment columns.
//!
//! | Format | Extension(s) | Writer |
//! |---|---|---|
//! | [`OutputFormat::Xlsx`] | `.xlsx` | [`spreadsheet`] |
//! | [`OutputFormat::Csv`] | `.csv` | [`delimited`] |
//! | [`OutputFormat::Json`] | `.json` | [`records`] |
//! | [`OutputFormat::Sqlite`] | `.db`, `.sqlite`, `.sql` | [`relational`] |

pub mod delimited;
pub mod records;
pub mod relational;
pub mod spreadsheet;

use std::path::{Path, PathBuf};

use geo_enrich_models::{Dataset, OutputFormat};
use thiserror::Error;

/// Basename used when no output path is configured.
pub const DEFAULT_OUTPUT_BASENAME: &str = "geocoded_records";

/// Errors raised while writing the output file.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Workbook error.
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// `SQLite` error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The task running the writer died before returning.
    #[error("Writer task failed: {0}")]
    Task(String),
}

/// Appends the format's default extension unless `output` already ends
/// with one of its accepted extensions (case-insensitive). An empty
/// `output` becomes [`DEFAULT_OUTPUT_BASENAME`].
#[must_use]
pub fn resolve_output_path(output: &str, format: OutputFormat) -> PathBuf {
    let output = if output.trim().is_empty() {
        DEFAULT_OUTPUT_BASENAME
    } else {
        output
    };

    let lower = output.to_lowercase();
    if format
        .accepted_extensions()
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        PathBuf::from(output)
    } else {
        PathBuf::from(format!("{output}{}", format.default_extension()))
    }
}

/// Writes `dataset` to `output` (extension normalized) in `format`.
///
/// Returns the path actually written.
///
/// # Errors
///
/// Returns [`SinkError`] if the parent directory cannot be created or the
/// writer fails. The dataset is never modified.
pub fn persist(
    dataset: &Dataset,
    output: &str,
    format: OutputFormat,
) -> Result<PathBuf, SinkError> {
    let path = resolve_output_path(output, format);
    ensure_parent(&path)?;

    match format {
        OutputFormat::Xlsx => spreadsheet::write(dataset, &path)?,
        OutputFormat::Csv => delimited::write(dataset, &path)?,
        OutputFormat::Json => records::write(dataset, &path)?,
        OutputFormat::Sqlite => relational::write(dataset, &path)?,
    }

    log::info!(
        "Saved {} records as {format} to {}",
        dataset.len(),
        path.display()
    );
    Ok(path)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}
