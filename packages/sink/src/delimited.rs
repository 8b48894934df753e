//! Comma-delimited text writer.

use std::path::Path;

use geo_enrich_models::Dataset;

use crate::SinkError;

/// Writes a header row followed by one line per record.
///
/// # Errors
///
/// Returns [`SinkError`] if the file cannot be created or written.
pub fn write(dataset: &Dataset, path: &Path) -> Result<(), SinkError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(dataset.output_headers())?;

    for record in dataset.records() {
        let row = record
            .cells
            .iter()
            .map(ToString::to_string)
            .chain(record.enrichment.values().into_iter().map(str::to_string));
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}
