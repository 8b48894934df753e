#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persisted run configuration for geo-enrich.
//!
//! Settings live in a flat TOML file (default [`DEFAULT_CONFIG_FILE`]).
//! Parsing is deliberately lenient: numeric settings accept integers,
//! floats, or numeric strings, and any value that does not make sense
//! (unparsable, zero batch size, negative delay) silently falls back to
//! its default. A missing file yields [`RunConfig::default`].

use std::path::Path;
use std::time::Duration;

use geo_enrich_models::OutputFormat;
use serde::Serialize;
use thiserror::Error;

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "geo_enrich.toml";

pub const DEFAULT_TEMP_FOLDER: &str = "tmp";
pub const DEFAULT_OUTPUT: &str = "geocoded_records";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_DELAY_SECONDS: f64 = 1.5;
pub const DEFAULT_USER_AGENT: &str = "GeoEnrich/0.1 (contact@example.com)";

/// Errors from reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings for one processing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    /// Scratch directory, created at startup when non-empty.
    pub temp_folder: String,
    /// Input file (`.csv` or `.xlsx`).
    pub input: String,
    /// Output path or basename; the extension is added per format.
    pub output: String,
    /// Records per batch before the inter-batch delay.
    pub batch_size: usize,
    /// Inter-batch delay in seconds.
    pub delay_seconds: f64,
    /// `User-Agent` sent to the reverse geocoder.
    pub user_agent: String,
    pub output_format: OutputFormat,
    /// Overrides the reverse geocoder endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geocoder_url: Option<String>,
    /// Overrides the municipality registry endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
    /// Reuse the registry list for the whole run instead of fetching it
    /// for every lookup.
    pub cache_registry: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            temp_folder: DEFAULT_TEMP_FOLDER.to_string(),
            input: String::new(),
            output: DEFAULT_OUTPUT.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            delay_seconds: DEFAULT_DELAY_SECONDS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output_format: OutputFormat::default(),
            geocoder_url: None,
            registry_url: None,
            cache_registry: true,
        }
    }
}

fn as_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses a batch size; only positive whole numbers are accepted.
#[must_use]
pub fn parse_batch_size(value: &toml::Value) -> Option<usize> {
    match value {
        toml::Value::Integer(i) => usize::try_from(*i).ok(),
        toml::Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
}

/// Parses a delay in seconds; must be finite and non-negative.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn parse_delay_seconds(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Integer(i) => Some(*i as f64),
        toml::Value::Float(f) => Some(*f),
        toml::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|d| d.is_finite() && *d >= 0.0)
}

fn parse_bool(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        toml::Value::Integer(i) => Some(*i != 0),
        _ => None,
    }
}

impl RunConfig {
    /// Builds a configuration from a parsed TOML table, falling back to
    /// defaults key by key. Unknown keys are ignored.
    #[must_use]
    pub fn from_table(table: &toml::Table) -> Self {
        let defaults = Self::default();
        let text = |key: &str| table.get(key).and_then(as_text);
        let url = |key: &str| text(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        Self {
            temp_folder: text("temp_folder").unwrap_or(defaults.temp_folder),
            input: text("input").unwrap_or(defaults.input),
            output: text("output")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.output),
            batch_size: table
                .get("batch_size")
                .and_then(parse_batch_size)
                .unwrap_or(defaults.batch_size),
            delay_seconds: table
                .get("delay_seconds")
                .and_then(parse_delay_seconds)
                .unwrap_or(defaults.delay_seconds),
            user_agent: text("user_agent")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            output_format: text("output_format")
                .map_or(defaults.output_format, |s| OutputFormat::from_setting(&s)),
            geocoder_url: url("geocoder_url"),
            registry_url: url("registry_url"),
            cache_registry: table
                .get("cache_registry")
                .and_then(parse_bool)
                .unwrap_or(defaults.cache_registry),
        }
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = s.parse()?;
        Ok(Self::from_table(&table))
    }

    /// Loads configuration from `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or is
    /// not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "No configuration at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Serializes the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Writes the configuration to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        log::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Inter-batch delay as a [`Duration`].
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_DELAY_SECONDS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.batch_size, 10);
        assert!((config.delay_seconds - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.output_format, OutputFormat::Xlsx);
    }

    #[test]
    fn reads_all_keys() {
        let config = RunConfig::from_toml_str(
            r#"
            temp_folder = "scratch"
            input = "points.csv"
            output = "out/enriched"
            batch_size = 25
            delay_seconds = 0.5
            user_agent = "Test/1.0"
            output_format = "json"
            geocoder_url = "http://localhost:8080/reverse"
            registry_url = "http://localhost:8081/municipios"
            cache_registry = false
            "#,
        )
        .unwrap();

        assert_eq!(config.temp_folder, "scratch");
        assert_eq!(config.input, "points.csv");
        assert_eq!(config.output, "out/enriched");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.delay(), Duration::from_millis(500));
        assert_eq!(config.user_agent, "Test/1.0");
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.geocoder_url.as_deref(), Some("http://localhost:8080/reverse"));
        assert_eq!(config.registry_url.as_deref(), Some("http://localhost:8081/municipios"));
        assert!(!config.cache_registry);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let config =
            RunConfig::from_toml_str("batch_size = \"20\"\ndelay_seconds = \"2\"").unwrap();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.delay(), Duration::from_secs(2));
    }

    #[test]
    fn invalid_numbers_fall_back_silently() {
        let config = RunConfig::from_toml_str(
            "batch_size = \"ten\"\ndelay_seconds = -3.0\noutput_format = \"parquet\"",
        )
        .unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!((config.delay_seconds - DEFAULT_DELAY_SECONDS).abs() < f64::EPSILON);
        assert_eq!(config.output_format, OutputFormat::Xlsx);

        let config = RunConfig::from_toml_str("batch_size = 0\nbatch_size_extra = 1").unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);

        let config = RunConfig::from_toml_str("batch_size = 2.5").unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn blank_urls_and_output_use_defaults() {
        let config =
            RunConfig::from_toml_str("geocoder_url = \"  \"\noutput = \"\"\nuser_agent = \"\"")
                .unwrap();
        assert_eq!(config.geocoder_url, None);
        assert_eq!(config.output, DEFAULT_OUTPUT);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            RunConfig::from_toml_str("batch_size = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geo_enrich.toml");

        let config = RunConfig {
            input: "in.xlsx".to_string(),
            batch_size: 3,
            delay_seconds: 0.0,
            output_format: OutputFormat::Sqlite,
            registry_url: Some("http://registry.local".to_string()),
            ..RunConfig::default()
        };
        config.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("output_format = \"sql\""));
        assert!(!text.contains("geocoder_url"));

        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }
}
