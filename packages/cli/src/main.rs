#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line control plane for geo-enrich.
//!
//! Loads the run configuration, starts an enrichment session, and lets the
//! user pause, resume, or cancel it from stdin while an `indicatif` bar
//! shows progress and ETA.
//!
//! Uses `indicatif-log-bridge` (via [`geo_enrich_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod run;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use geo_enrich_config::{DEFAULT_CONFIG_FILE, RunConfig};
use geo_enrich_models::OutputFormat;

#[derive(Parser)]
#[command(name = "geo_enrich", about = "Reverse-geocode and enrich coordinate datasets")]
struct Cli {
    /// Path to the TOML run configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich the configured input file
    Run(RunArgs),
    /// Write a configuration file with default settings
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Per-run overrides of the configuration file.
#[derive(Args, Default)]
struct RunArgs {
    /// Input file (`.csv` or `.xlsx`) with `latitude` and `longitude` columns
    #[arg(long)]
    input: Option<String>,
    /// Output path or basename; the extension follows `--format`
    #[arg(long)]
    output: Option<String>,
    /// Output format: xlsx, csv, json, or sql
    #[arg(long)]
    format: Option<OutputFormat>,
    /// Records per batch
    #[arg(long)]
    batch_size: Option<NonZeroUsize>,
    /// Seconds to wait between batches
    #[arg(long, value_parser = parse_delay)]
    delay: Option<f64>,
    /// `User-Agent` sent to the reverse geocoder
    #[arg(long)]
    user_agent: Option<String>,
    /// Reverse geocoder endpoint
    #[arg(long)]
    geocoder_url: Option<String>,
    /// Municipality registry endpoint
    #[arg(long)]
    registry_url: Option<String>,
    /// Fetch the municipality registry for every lookup instead of once
    #[arg(long)]
    no_registry_cache: bool,
    /// Write the effective configuration back to the config file
    #[arg(long)]
    save: bool,
}

fn parse_delay(s: &str) -> Result<f64, String> {
    let value: f64 = s.trim().parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err("delay must be a non-negative number of seconds".to_string())
    }
}

impl RunArgs {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(input) = &self.input {
            config.input.clone_from(input);
        }
        if let Some(output) = self.output.as_ref().filter(|s| !s.trim().is_empty()) {
            config.output.clone_from(output);
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size.get();
        }
        if let Some(delay) = self.delay {
            config.delay_seconds = delay;
        }
        if let Some(user_agent) = &self.user_agent {
            config.user_agent.clone_from(user_agent);
        }
        if let Some(url) = &self.geocoder_url {
            config.geocoder_url = Some(url.clone());
        }
        if let Some(url) = &self.registry_url {
            config.registry_url = Some(url.clone());
        }
        if self.no_registry_cache {
            config.cache_registry = false;
        }
    }
}

fn ensure_temp_folder(config: &RunConfig) -> std::io::Result<()> {
    let folder = config.temp_folder.trim();
    if folder.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(folder)?;
    log::debug!("Temp folder: {folder}");
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    RunConfig::default().save(path)?;
    log::info!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geo_enrich_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { force } => init_config(&cli.config, force)?,
        Commands::ShowConfig => {
            let config = RunConfig::load(&cli.config)?;
            print!("{}", config.to_toml_string()?);
        }
        Commands::Run(args) => {
            let mut config = RunConfig::load(&cli.config)?;
            args.apply(&mut config);
            ensure_temp_folder(&config)?;

            if args.save {
                config.save(&cli.config)?;
                log::info!("Saved configuration to {}", cli.config.display());
            }

            let report = run::run(&multi, &config).await?;
            run::print_summary(&report);

            if !report.is_success() {
                return Err(format!("Run {}", report.state).into());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory as _;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_override_config() {
        let cli = Cli::try_parse_from([
            "geo_enrich",
            "run",
            "--input",
            "points.csv",
            "--format",
            "sqlite",
            "--batch-size",
            "5",
            "--delay",
            "0",
            "--no-registry-cache",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let mut config = RunConfig::default();
        args.apply(&mut config);

        assert_eq!(config.input, "points.csv");
        assert_eq!(config.output_format, OutputFormat::Sqlite);
        assert_eq!(config.batch_size, 5);
        assert!(config.delay_seconds.abs() < f64::EPSILON);
        assert!(!config.cache_registry);
        assert_eq!(config.output, geo_enrich_config::DEFAULT_OUTPUT);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn rejects_zero_batch_size_and_negative_delay() {
        assert!(Cli::try_parse_from(["geo_enrich", "run", "--batch-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["geo_enrich", "run", "--delay", "-1"]).is_err());
    }

    #[test]
    fn no_overrides_keeps_config() {
        let mut config = RunConfig::default();
        RunArgs::default().apply(&mut config);
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn init_config_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geo_enrich.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();

        assert_eq!(RunConfig::load(&path).unwrap(), RunConfig::default());
    }

    #[test]
    fn creates_temp_folder() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            temp_folder: dir.path().join("scratch").to_string_lossy().into_owned(),
            ..RunConfig::default()
        };
        ensure_temp_folder(&config).unwrap();
        assert!(dir.path().join("scratch").is_dir());
    }
}
