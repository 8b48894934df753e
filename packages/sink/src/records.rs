//! JSON writer: an array with one object per record.
//!
//! Keys follow the output column order, output is indented by two
//! spaces, and non-ASCII text is written as UTF-8 rather than escaped.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use geo_enrich_models::{Cell, Dataset, ENRICHMENT_COLUMNS, Record};
use serde::ser::{SerializeMap as _, SerializeSeq as _};
use serde::{Serialize, Serializer};

use crate::SinkError;

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

struct CellValue<'a>(&'a Cell);

impl Serialize for CellValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Cell::Empty => serializer.serialize_none(),
            #[allow(clippy::cast_possible_truncation)]
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT_INT => {
                serializer.serialize_i64(*n as i64)
            }
            Cell::Number(n) => serializer.serialize_f64(*n),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

struct RecordObject<'a> {
    headers: &'a [String],
    record: &'a Record,
}

impl Serialize for RecordObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map =
            serializer.serialize_map(Some(self.headers.len() + ENRICHMENT_COLUMNS.len()))?;
        for (header, cell) in self.headers.iter().zip(&self.record.cells) {
            map.serialize_entry(header, &CellValue(cell))?;
        }
        for (column, value) in ENRICHMENT_COLUMNS.iter().zip(self.record.enrichment.values()) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct RecordArray<'a>(&'a Dataset);

impl Serialize for RecordArray<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for record in self.0.records() {
            seq.serialize_element(&RecordObject {
                headers: self.0.headers(),
                record,
            })?;
        }
        seq.end()
    }
}

/// Writes the dataset as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`SinkError`] if the file cannot be created or written.
pub fn write(dataset: &Dataset, path: &Path) -> Result<(), SinkError> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, &RecordArray(dataset))?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_dataset;

    #[test]
    fn writes_objects_in_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write(&sample_dataset(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"São Paulo\""), "non-ASCII must not be escaped");
        assert!(text.starts_with("[\n  {\n    \"id\": 1,"));

        let id_pos = text.find("\"id\"").unwrap();
        let lat_pos = text.find("\"latitude\"").unwrap();
        let city_pos = text.find("\"city\"").unwrap();
        assert!(id_pos < lat_pos && lat_pos < city_pos);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["latitude"], serde_json::json!(-23.55));
        assert_eq!(rows[0]["municipality_code"], "3550308");
        assert_eq!(rows[1]["latitude"], serde_json::Value::Null);
        assert_eq!(rows[1]["city"], "");
        assert_eq!(rows[2]["latitude"], "-22.9");
        assert_eq!(rows[2]["state_abbr"], "");
    }
}
