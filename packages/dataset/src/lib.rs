#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input loading for geo-enrich.
//!
//! Reads a comma-delimited `.csv` file or the first worksheet of an
//! `.xlsx` workbook into a [`Dataset`]. The first row is always the
//! header, and the `latitude` / `longitude` columns are validated before
//! any processing can start.

use std::path::Path;

use calamine::{Data, Reader as _, open_workbook_auto};
use geo_enrich_models::{Cell, Dataset, ENRICHMENT_COLUMNS, SchemaError};
use thiserror::Error;

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file extension is neither `.csv` nor `.xlsx`.
    #[error("Unsupported input file extension: '{0}' (expected .csv or .xlsx)")]
    UnsupportedExtension(String),

    /// The file could not be opened or read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Workbook parsing failed.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// The workbook has no worksheet.
    #[error("Spreadsheet has no worksheets")]
    NoWorksheet,

    /// Required columns are missing.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Input formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Xlsx,
}

impl InputFormat {
    /// Detects the format from the (case-insensitive) file extension.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::UnsupportedExtension`] for anything other
    /// than `.csv` or `.xlsx`.
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            _ => Err(DatasetError::UnsupportedExtension(ext)),
        }
    }
}

/// Loads and validates an input file.
///
/// # Errors
///
/// Returns [`DatasetError`] if the extension is unsupported, the file
/// cannot be read, or the `latitude` / `longitude` columns are missing.
pub fn load_dataset(path: &Path) -> Result<Dataset, DatasetError> {
    let (headers, rows) = match InputFormat::from_path(path)? {
        InputFormat::Csv => read_csv(std::fs::File::open(path)?)?,
        InputFormat::Xlsx => read_xlsx(path)?,
    };

    for shadowed in headers
        .iter()
        .filter(|h| ENRICHMENT_COLUMNS.contains(&h.trim()))
    {
        log::warn!("Input column '{shadowed}' is replaced by the enrichment column of the same name");
    }

    let dataset = Dataset::new(headers, rows)?;
    log::info!(
        "Loaded {} records ({} columns) from {}",
        dataset.len(),
        dataset.headers().len(),
        path.display()
    );
    Ok(dataset)
}

type Table = (Vec<String>, Vec<Vec<Cell>>);

/// Reads comma-delimited text with a header row.
fn read_csv<R: std::io::Read>(reader: R) -> Result<Table, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record?.iter().map(Cell::from_raw).collect());
    }

    Ok((headers, rows))
}

/// Reads the first worksheet of a workbook; the first row is the header.
fn read_xlsx(path: &Path) -> Result<Table, DatasetError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(DatasetError::NoWorksheet)??;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|c| data_to_cell(c).to_string()).collect())
        .unwrap_or_default();

    let rows = rows
        .map(|row| row.iter().map(data_to_cell).collect())
        .collect();

    Ok((headers, rows))
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        #[allow(clippy::cast_precision_loss)]
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) if f.is_finite() => Cell::Number(*f),
        Data::Float(f) => Cell::Text(f.to_string()),
        Data::Bool(b) => Cell::Bool(*b),
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::Error(e) => Cell::Text(format!("{e:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;

    #[test]
    fn detects_input_format() {
        assert_eq!(InputFormat::from_path(Path::new("a.CSV")).unwrap(), InputFormat::Csv);
        assert_eq!(InputFormat::from_path(Path::new("a.xlsx")).unwrap(), InputFormat::Xlsx);
        assert!(matches!(
            InputFormat::from_path(Path::new("a.json")),
            Err(DatasetError::UnsupportedExtension(ext)) if ext == "json"
        ));
        assert!(matches!(
            InputFormat::from_path(Path::new("noext")),
            Err(DatasetError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn loads_csv_with_missing_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "id,latitude,longitude,note").unwrap();
        writeln!(f, "1,-23.55,-46.63,centro").unwrap();
        writeln!(f, "2,,,").unwrap();
        writeln!(f, "3,-22.90,-43.17").unwrap();
        drop(f);

        let ds = load_dataset(&path).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.headers(), ["id", "latitude", "longitude", "note"]);
        assert_eq!(ds.records()[0].coordinates(), Some((-23.55, -46.63)));
        assert_eq!(ds.records()[1].coordinates(), None);
        assert_eq!(ds.records()[2].coordinates(), Some((-22.90, -43.17)));
        assert_eq!(ds.records()[2].cells[3], Cell::Empty);
        assert_eq!(ds.records()[0].cells[3], Cell::Text("centro".to_string()));
    }

    #[test]
    fn strips_utf8_bom_from_first_header() {
        let (headers, _) = read_csv("\u{feff}latitude,longitude\n1,2\n".as_bytes()).unwrap();
        assert_eq!(headers, ["latitude", "longitude"]);
    }

    #[test]
    fn rejects_csv_without_longitude() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        std::fs::write(&path, "latitude,lon\n1,2\n").unwrap();

        assert!(matches!(
            load_dataset(&path),
            Err(DatasetError::Schema(SchemaError::MissingColumn("longitude")))
        ));
    }

    #[test]
    fn rejects_unsupported_extension_before_reading() {
        assert!(matches!(
            load_dataset(Path::new("/nonexistent/points.txt")),
            Err(DatasetError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn loads_first_worksheet_of_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "latitude").unwrap();
        sheet.write_string(0, 1, "longitude").unwrap();
        sheet.write_string(0, 2, "name").unwrap();
        sheet.write_number(1, 0, -23.55).unwrap();
        sheet.write_number(1, 1, -46.63).unwrap();
        sheet.write_string(1, 2, "Sé").unwrap();
        sheet.write_string(2, 2, "sem coordenadas").unwrap();
        workbook.save(&path).unwrap();

        let ds = load_dataset(&path).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[0].coordinates(), Some((-23.55, -46.63)));
        assert_eq!(ds.records()[0].cells[2], Cell::Text("Sé".to_string()));
        assert_eq!(ds.records()[1].coordinates(), None);
    }
}
