#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the geo-enrich toolchain.
//!
//! A [`Dataset`] is the ordered set of input [`Record`]s for one run.
//! Each record keeps its original cells untouched and carries an
//! [`Enrichment`] block that the batch engine fills in from the reverse
//! geocoder ([`AddressComponents`]) and the municipality registry
//! ([`MunicipalityEntry`]).

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Name of the required latitude column.
pub const LATITUDE_COLUMN: &str = "latitude";

/// Name of the required longitude column.
pub const LONGITUDE_COLUMN: &str = "longitude";

/// Enrichment columns appended after the input columns, in output order.
pub const ENRICHMENT_COLUMNS: [&str; 9] = [
    "city",
    "state",
    "municipality_name",
    "municipality_code",
    "meso_region_name",
    "meso_region_code",
    "state_name",
    "state_code",
    "state_abbr",
];

/// Address keys consulted for the city, highest priority first.
pub const CITY_KEYS: [&str; 4] = ["city", "town", "village", "cidade"];

/// Address keys consulted for the state, highest priority first.
pub const STATE_KEYS: [&str; 3] = ["state_code", "state", "estado"];

/// Errors raised while building a [`Dataset`] from tabular input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A required column is absent from the header row.
    #[error("Input is missing required column '{0}'")]
    MissingColumn(&'static str),
}

/// A single input cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    /// No value.
    #[default]
    Empty,
    /// A finite numeric value.
    Number(f64),
    /// A boolean value (spreadsheet input only).
    Bool(bool),
    /// Any other value, kept verbatim.
    Text(String),
}

impl Cell {
    /// Infers a cell from raw delimited-text input.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::Empty;
        }
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Interprets the cell as a coordinate component.
    ///
    /// Empty, unparsable, and non-finite values yield `None`.
    #[must_use]
    pub fn as_coordinate(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Returns `true` for [`Cell::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Address components returned by the reverse geocoder.
///
/// Keys follow the provider's naming (`city`, `town`, `state`, ...);
/// no key is guaranteed to be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressComponents(pub BTreeMap<String, String>);

impl AddressComponents {
    /// Returns the first non-empty value among `keys`, or `""`.
    #[must_use]
    pub fn first_of(&self, keys: &[&str]) -> &str {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .map(String::as_str)
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }

    /// The resolved city, following [`CITY_KEYS`] priority.
    #[must_use]
    pub fn city(&self) -> &str {
        self.first_of(&CITY_KEYS)
    }

    /// The resolved state, following [`STATE_KEYS`] priority.
    #[must_use]
    pub fn state(&self) -> &str {
        self.first_of(&STATE_KEYS)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AddressComponents {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A municipality as published by the registry.
///
/// Identifiers are kept as decimal strings; any field the registry left
/// null is an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MunicipalityEntry {
    /// Canonical municipality name.
    pub name: String,
    /// Municipality code.
    pub id: String,
    /// Meso-region name.
    pub meso_region_name: String,
    /// Meso-region code.
    pub meso_region_id: String,
    /// State name.
    pub state_name: String,
    /// State code.
    pub state_id: String,
    /// Two-letter state abbreviation.
    pub state_abbr: String,
}

/// Fields written into a record during processing.
///
/// A field is only ever overwritten with a non-empty value, so once set
/// it never reverts to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    city: String,
    state: String,
    municipality_name: String,
    municipality_code: String,
    meso_region_name: String,
    meso_region_code: String,
    state_name: String,
    state_code: String,
    state_abbr: String,
}

fn write_field(slot: &mut String, value: &str) {
    if !value.is_empty() {
        value.clone_into(slot);
    }
}

impl Enrichment {
    /// Writes the geocoded city and state.
    pub fn set_address(&mut self, city: &str, state: &str) {
        write_field(&mut self.city, city);
        write_field(&mut self.state, state);
    }

    /// Merges the seven registry fields.
    pub fn apply_municipality(&mut self, entry: &MunicipalityEntry) {
        write_field(&mut self.municipality_name, &entry.name);
        write_field(&mut self.municipality_code, &entry.id);
        write_field(&mut self.meso_region_name, &entry.meso_region_name);
        write_field(&mut self.meso_region_code, &entry.meso_region_id);
        write_field(&mut self.state_name, &entry.state_name);
        write_field(&mut self.state_code, &entry.state_id);
        write_field(&mut self.state_abbr, &entry.state_abbr);
    }

    #[must_use]
    pub fn city(&self) -> &str {
        &self.city
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    #[must_use]
    pub fn municipality_name(&self) -> &str {
        &self.municipality_name
    }

    #[must_use]
    pub fn municipality_code(&self) -> &str {
        &self.municipality_code
    }

    /// Values in [`ENRICHMENT_COLUMNS`] order.
    #[must_use]
    pub fn values(&self) -> [&str; 9] {
        [
            &self.city,
            &self.state,
            &self.municipality_name,
            &self.municipality_code,
            &self.meso_region_name,
            &self.meso_region_code,
            &self.state_name,
            &self.state_code,
            &self.state_abbr,
        ]
    }

    /// Returns `true` when no field has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values().iter().all(|v| v.is_empty())
    }
}

/// One input row plus its enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Original cells, aligned with [`Dataset::headers`].
    pub cells: Vec<Cell>,
    /// Latitude (WGS84). `None` when absent or unparsable.
    pub latitude: Option<f64>,
    /// Longitude (WGS84). `None` when absent or unparsable.
    pub longitude: Option<f64>,
    /// Output fields filled in by the batch engine.
    pub enrichment: Enrichment,
}

impl Record {
    /// Returns both coordinates when present.
    #[must_use]
    pub const fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Renames repeated column names so every output column is unique.
///
/// Names are compared case-insensitively, since `SQLite` column names
/// are. The first occurrence keeps its name and later ones become
/// `name.1`, `name.2`, ... The enrichment column names and the headers
/// at `reserved` are claimed up front, so those keep their exact name.
#[must_use]
pub fn dedupe_headers(headers: Vec<String>, reserved: &[usize]) -> Vec<String> {
    let mut taken: HashSet<String> = ENRICHMENT_COLUMNS
        .iter()
        .map(|c| c.to_ascii_lowercase())
        .chain(
            reserved
                .iter()
                .filter_map(|&i| headers.get(i))
                .map(|h| h.to_ascii_lowercase()),
        )
        .collect();

    headers
        .into_iter()
        .enumerate()
        .map(|(i, header)| {
            if reserved.contains(&i) {
                return header;
            }
            let mut name = header.clone();
            let mut n = 1;
            while !taken.insert(name.to_ascii_lowercase()) {
                name = format!("{header}.{n}");
                n += 1;
            }
            name
        })
        .collect()
}

/// An ordered, fixed-length sequence of records sharing one header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    headers: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Builds a dataset from a header row and raw rows.
    ///
    /// Header names are trimmed. Columns named like an enrichment column
    /// are dropped, since the run re-initialises those fields. Remaining
    /// names that repeat an earlier one (ignoring ASCII case) get a `.N`
    /// suffix, see [`dedupe_headers`]. Rows are padded or truncated to the
    /// header width.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingColumn`] if `latitude` or `longitude`
    /// is not among the headers.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, SchemaError> {
        let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();
        let keep: Vec<bool> = headers
            .iter()
            .map(|h| !ENRICHMENT_COLUMNS.contains(&h.as_str()))
            .collect();
        let width = headers.len();

        let headers: Vec<String> = headers
            .into_iter()
            .zip(&keep)
            .filter_map(|(h, k)| k.then_some(h))
            .collect();

        let lat_idx = headers
            .iter()
            .position(|h| h == LATITUDE_COLUMN)
            .ok_or(SchemaError::MissingColumn(LATITUDE_COLUMN))?;
        let lon_idx = headers
            .iter()
            .position(|h| h == LONGITUDE_COLUMN)
            .ok_or(SchemaError::MissingColumn(LONGITUDE_COLUMN))?;
        let headers = dedupe_headers(headers, &[lat_idx, lon_idx]);

        let records = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                let cells: Vec<Cell> = row
                    .into_iter()
                    .zip(&keep)
                    .filter_map(|(c, k)| k.then_some(c))
                    .collect();
                Record {
                    latitude: cells[lat_idx].as_coordinate(),
                    longitude: cells[lon_idx].as_coordinate(),
                    cells,
                    enrichment: Enrichment::default(),
                }
            })
            .collect();

        Ok(Self { headers, records })
    }

    /// Input column names, in input order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Input columns followed by [`ENRICHMENT_COLUMNS`].
    #[must_use]
    pub fn output_headers(&self) -> Vec<&str> {
        self.headers
            .iter()
            .map(String::as_str)
            .chain(ENRICHMENT_COLUMNS)
            .collect()
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Output file format for the result sink.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// Excel workbook.
    #[default]
    Xlsx,
    /// Comma-delimited text.
    Csv,
    /// Array of JSON objects.
    Json,
    /// Single-table `SQLite` database.
    #[serde(rename = "sql", alias = "sqlite")]
    #[strum(to_string = "sql", serialize = "sqlite")]
    Sqlite,
}

impl OutputFormat {
    /// Parses a setting value, falling back to [`OutputFormat::Xlsx`] for
    /// anything unrecognised.
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        value.trim().parse().unwrap_or_default()
    }

    /// Extension appended when the output path has none of the
    /// [`accepted_extensions`](Self::accepted_extensions).
    #[must_use]
    pub const fn default_extension(self) -> &'static str {
        match self {
            Self::Xlsx => ".xlsx",
            Self::Csv => ".csv",
            Self::Json => ".json",
            Self::Sqlite => ".db",
        }
    }

    #[must_use]
    pub const fn accepted_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Xlsx => &[".xlsx"],
            Self::Csv => &[".csv"],
            Self::Json => &[".json"],
            Self::Sqlite => &[".db", ".sqlite", ".sql"],
        }
    }
}
