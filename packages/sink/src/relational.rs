//! `SQLite` writer: a single table, replaced wholesale on every write.

use std::path::Path;

use geo_enrich_models::{Cell, Dataset, ENRICHMENT_COLUMNS};
use rusqlite::Connection;
use rusqlite::types::Value;

use crate::SinkError;

/// Table holding the enriched records.
pub const TABLE_NAME: &str = "geocoded_records";

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `REAL` when every non-empty value in column `idx` is numeric.
fn column_affinity(dataset: &Dataset, idx: usize) -> &'static str {
    let numeric = dataset
        .records()
        .iter()
        .map(|r| &r.cells[idx])
        .filter(|c| !c.is_empty())
        .all(|c| matches!(c, Cell::Number(_)));
    if numeric { "REAL" } else { "TEXT" }
}

fn to_sql_value(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Number(n) => Value::Real(*n),
        Cell::Bool(b) => Value::Integer(i64::from(*b)),
        Cell::Text(s) => Value::Text(s.clone()),
    }
}

/// Drops and recreates [`TABLE_NAME`], then inserts every record in one
/// transaction.
///
/// # Errors
///
/// Returns [`SinkError::Sqlite`] if the database cannot be opened or any
/// statement fails.
pub fn write(dataset: &Dataset, path: &Path) -> Result<(), SinkError> {
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;

    let columns: Vec<String> = dataset
        .headers()
        .iter()
        .enumerate()
        .map(|(idx, h)| format!("{} {}", quote_ident(h), column_affinity(dataset, idx)))
        .chain(
            ENRICHMENT_COLUMNS
                .iter()
                .map(|c| format!("{} TEXT", quote_ident(c))),
        )
        .collect();

    let table = quote_ident(TABLE_NAME);
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table};
         CREATE TABLE {table} ({});",
        columns.join(", ")
    ))?;

    {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table} VALUES ({})",
            placeholders.join(", ")
        ))?;

        for record in dataset.records() {
            let values = record.cells.iter().map(to_sql_value).chain(
                record
                    .enrichment
                    .values()
                    .into_iter()
                    .map(|v| Value::Text(v.to_string())),
            );
            stmt.execute(rusqlite::params_from_iter(values))?;
        }
    }

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_dataset;

    #[test]
    fn writes_single_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        write(&sample_dataset(), &path).unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM geocoded_records", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);

        let (city, code): (String, String) = conn
            .query_row(
                "SELECT city, municipality_code FROM geocoded_records WHERE id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(city, "São Paulo");
        assert_eq!(code, "3550308");

        let lat: Option<f64> = conn
            .query_row("SELECT latitude FROM geocoded_records WHERE id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(lat, None);
    }

    #[test]
    fn replaces_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sqlite");
        write(&sample_dataset(), &path).unwrap();
        write(&sample_dataset(), &path).unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM geocoded_records", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn mixed_columns_are_text() {
        let ds = sample_dataset();
        assert_eq!(column_affinity(&ds, 0), "REAL");
        assert_eq!(column_affinity(&ds, 1), "TEXT");
        assert_eq!(column_affinity(&ds, 2), "REAL");
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
