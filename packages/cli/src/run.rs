//! The `run` subcommand: load the input, drive a session, report.

use std::path::Path;
use std::sync::Arc;

use geo_enrich_cli_utils::{IndicatifProgress, MultiProgress};
use geo_enrich_config::RunConfig;
use geo_enrich_engine::eta::format_hms;
use geo_enrich_engine::{
    BatchSession, BatchSettings, Lookups, OutputTarget, RunControl, RunJob, RunReport,
};
use geo_enrich_geocoder::ReverseGeocoder;
use geo_enrich_geocoder::nominatim::{self, NominatimClient};
use geo_enrich_registry::ibge::{self, IbgeRegistry};
use geo_enrich_registry::{MunicipalityLookup, SnapshotPolicy};
use tokio::sync::mpsc;

use crate::commands::{self, HELP};

/// Builds the lookup clients described by `config`.
pub fn build_lookups(config: &RunConfig) -> Lookups {
    let geocoder_url = config
        .geocoder_url
        .as_deref()
        .unwrap_or(nominatim::DEFAULT_BASE_URL);
    let registry_url = config
        .registry_url
        .as_deref()
        .unwrap_or(ibge::DEFAULT_BASE_URL);
    let policy = if config.cache_registry {
        SnapshotPolicy::PerRun
    } else {
        SnapshotPolicy::PerLookup
    };

    log::debug!("Reverse geocoder: {geocoder_url}");
    log::debug!("Municipality registry: {registry_url} ({policy:?})");

    Lookups {
        geocoder: Arc::new(NominatimClient::new(geocoder_url, &config.user_agent))
            as Arc<dyn ReverseGeocoder>,
        registry: Arc::new(IbgeRegistry::new(registry_url, policy)) as Arc<dyn MunicipalityLookup>,
    }
}

/// Runs one enrichment job to completion, forwarding stdin commands and
/// Ctrl-C to it.
///
/// # Errors
///
/// Returns an error if no input is configured, the input cannot be
/// loaded, or the session refuses to start.
pub async fn run(
    multi: &MultiProgress,
    config: &RunConfig,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    if config.input.trim().is_empty() {
        return Err("No input file configured (set `input` or pass --input)".into());
    }

    let dataset = geo_enrich_dataset::load_dataset(Path::new(&config.input))?;

    let progress = IndicatifProgress::run_bar(multi, "Starting...");
    let job = RunJob {
        settings: BatchSettings {
            batch_size: config.batch_size,
            delay: config.delay(),
        },
        lookups: build_lookups(config),
        output: OutputTarget {
            path: config.output.clone(),
            format: config.output_format,
        },
        progress,
    };

    let session = BatchSession::new();
    let handle = session.start(dataset, job)?;
    let control = handle.control();

    log::info!("{HELP}");
    let (tx, mut rx) = mpsc::unbounded_channel();
    commands::spawn_stdin_reader(tx);

    let wait = handle.wait();
    tokio::pin!(wait);

    let mut watch_interrupts = true;
    let report = loop {
        tokio::select! {
            report = &mut wait => break report?,
            Some(cmd) = rx.recv() => commands::apply(cmd, &control),
            result = tokio::signal::ctrl_c(), if watch_interrupts => {
                watch_interrupts = on_interrupt(result, &control);
            }
        }
    };

    Ok(report)
}

/// Cancels the run when Ctrl-C was delivered. A failure to install the
/// handler is logged and leaves the run going.
///
/// Returns whether Ctrl-C should keep being watched.
fn on_interrupt(result: std::io::Result<()>, control: &RunControl) -> bool {
    match result {
        Ok(()) => {
            log::warn!("Interrupt received, cancelling after the current record...");
            control.cancel();
            true
        }
        Err(e) => {
            log::error!("Failed to listen for Ctrl-C: {e}");
            false
        }
    }
}

/// Prints a one-line summary plus where the output went.
pub fn print_summary(report: &RunReport) {
    let o = &report.outcomes;
    println!(
        "Run {}: {}/{} records in {} ({} enriched, {} without coordinates, \
         {} geocoding failures, {} incomplete addresses, {} registry misses)",
        report.state,
        report.processed,
        report.total,
        format_hms(report.elapsed),
        o.enriched,
        o.skipped_no_coordinates,
        o.geocode_failed,
        o.address_incomplete,
        o.registry_miss,
    );
    match &report.output {
        Ok(path) => println!("Results saved to {}", path.display()),
        Err(e) => println!("Failed to save results: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_input_is_rejected_before_starting() {
        let multi = MultiProgress::with_draw_target(
            geo_enrich_cli_utils::ProgressDrawTarget::hidden(),
        );
        let config = RunConfig::default();
        let err = run(&multi, &config).await.unwrap_err();
        assert!(err.to_string().contains("No input file"));
    }

    #[tokio::test]
    async fn unsupported_input_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("points.txt");
        std::fs::write(&input, "latitude,longitude\n").unwrap();

        let multi = MultiProgress::with_draw_target(
            geo_enrich_cli_utils::ProgressDrawTarget::hidden(),
        );
        let config = RunConfig {
            input: input.to_string_lossy().into_owned(),
            ..RunConfig::default()
        };
        assert!(run(&multi, &config).await.is_err());
    }

    #[test]
    fn interrupt_cancels_the_run() {
        let control = RunControl::new(4);
        assert!(on_interrupt(Ok(()), &control));
        assert!(control.is_cancelled());
    }

    #[test]
    fn handler_failure_leaves_the_run_going() {
        let control = RunControl::new(4);
        let err = std::io::Error::other("signal driver unavailable");
        assert!(!on_interrupt(Err(err), &control));
        assert!(!control.is_cancelled());
    }
}
