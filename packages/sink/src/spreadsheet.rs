//! XLSX writer: one worksheet, header row first.

use std::path::Path;

use geo_enrich_models::{Cell, Dataset};
use rust_xlsxwriter::{ColNum, RowNum, Workbook, Worksheet, XlsxError};

use crate::SinkError;

fn write_cell(sheet: &mut Worksheet, row: RowNum, col: ColNum, cell: &Cell) -> Result<(), XlsxError> {
    match cell {
        Cell::Empty => {}
        Cell::Number(n) => {
            sheet.write_number(row, col, *n)?;
        }
        Cell::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Cell::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
    }
    Ok(())
}

/// Writes the dataset to a single-sheet workbook. Empty values are left
/// as blank cells.
///
/// # Errors
///
/// Returns [`SinkError::Xlsx`] if the sheet exceeds spreadsheet limits or
/// the file cannot be saved.
pub fn write(dataset: &Dataset, path: &Path) -> Result<(), SinkError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, header) in (0..).zip(dataset.output_headers()) {
        sheet.write_string(0, col, header)?;
    }

    for (row, record) in (1..).zip(dataset.records()) {
        let mut col: ColNum = 0;
        for cell in &record.cells {
            write_cell(sheet, row, col, cell)?;
            col += 1;
        }
        for value in record.enrichment.values() {
            if !value.is_empty() {
                sheet.write_string(row, col, value)?;
            }
            col += 1;
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_dataset;

    use calamine::{Data, Reader as _, Xlsx, open_workbook};

    #[test]
    fn writes_readable_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        write(&sample_dataset(), &path).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        let rows: Vec<&[Data]> = range.rows().collect();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0][0], Data::String("id".into()));
        assert_eq!(rows[0][3], Data::String("city".into()));
        assert_eq!(rows[1][1], Data::Float(-23.55));
        assert_eq!(rows[1][3], Data::String("São Paulo".into()));
        assert_eq!(rows[2][1], Data::Empty);
        assert_eq!(rows[2][3], Data::Empty);
        assert_eq!(rows[3][1], Data::String("-22.9".into()));
    }
}
