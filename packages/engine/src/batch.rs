//! The sequential, rate-limited record loop.
//!
//! Records are processed one at a time in fixed-size batches, with a
//! delay between batches to keep the request cadence against the external
//! services low. Pause and cancel are honored before each batch, before
//! each record, and on every tick of the inter-batch delay.

use std::sync::Arc;
use std::time::Duration;

use geo_enrich_geocoder::ReverseGeocoder;
use geo_enrich_models::{Dataset, Record};
use geo_enrich_registry::MunicipalityLookup;

use crate::control::RunControl;
use crate::eta::format_eta;
use crate::progress::ProgressCallback;

/// Granularity at which the inter-batch delay re-checks pause and cancel.
pub const DELAY_TICK: Duration = Duration::from_millis(100);

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between batches.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);

/// Batch size and inter-batch delay for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay: DEFAULT_DELAY,
        }
    }
}

/// The two external lookups a record goes through.
#[derive(Clone)]
pub struct Lookups {
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub registry: Arc<dyn MunicipalityLookup>,
}

/// What happened to a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    SkippedNoCoordinates,
    GeocodingFailed,
    /// Geocoded, but city or state was empty so the registry was not asked.
    AddressIncomplete,
    /// Registry was asked and had no match (or could not be fetched).
    MunicipalityNotFound,
    Enriched,
}

/// Per-outcome counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub enriched: u64,
    pub skipped_no_coordinates: u64,
    pub geocode_failed: u64,
    pub address_incomplete: u64,
    pub registry_miss: u64,
}

impl OutcomeCounts {
    pub const fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::SkippedNoCoordinates => self.skipped_no_coordinates += 1,
            RecordOutcome::GeocodingFailed => self.geocode_failed += 1,
            RecordOutcome::AddressIncomplete => self.address_incomplete += 1,
            RecordOutcome::MunicipalityNotFound => self.registry_miss += 1,
            RecordOutcome::Enriched => self.enriched += 1,
        }
    }
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Completed,
    Cancelled,
}

/// Runs every record of `dataset` through the lookups, writing results
/// back in place.
///
/// Returns [`LoopExit::Cancelled`] as soon as a cancel is observed at a
/// checkpoint. Records not reached keep empty enrichment fields.
pub async fn process_dataset(
    dataset: &mut Dataset,
    settings: &BatchSettings,
    lookups: &Lookups,
    control: &RunControl,
    progress: &dyn ProgressCallback,
    counts: &mut OutcomeCounts,
) -> LoopExit {
    let batch_size = settings.batch_size.max(1);
    let records = dataset.records_mut();
    let batch_count = records.len().div_ceil(batch_size);

    for (batch_idx, batch) in records.chunks_mut(batch_size).enumerate() {
        if !control.checkpoint().await {
            return LoopExit::Cancelled;
        }

        let offset = batch_idx * batch_size;
        log::debug!(
            "Batch {}/{batch_count}: records {}..{}",
            batch_idx + 1,
            offset,
            offset + batch.len()
        );

        for (i, record) in batch.iter_mut().enumerate() {
            if !control.checkpoint().await {
                return LoopExit::Cancelled;
            }

            let outcome = process_record(offset + i, record, lookups).await;
            counts.record(outcome);

            control.record_processed();
            progress.inc(1);
            progress.set_message(format!(
                "{} | ETA {}",
                status_label(control),
                format_eta(control.eta())
            ));
        }

        let is_last = batch_idx + 1 == batch_count;
        if !is_last && !inter_batch_delay(settings.delay, control).await {
            return LoopExit::Cancelled;
        }
    }

    LoopExit::Completed
}

/// Geocodes one record and, when both city and state resolve, merges the
/// registry entry into it.
pub async fn process_record(idx: usize, record: &mut Record, lookups: &Lookups) -> RecordOutcome {
    let Some((lat, lon)) = record.coordinates() else {
        log::info!("[{idx}] missing coordinates, skipping");
        return RecordOutcome::SkippedNoCoordinates;
    };

    let Some(address) = lookups.geocoder.reverse_geocode(lat, lon).await else {
        log::warn!("[{idx}] reverse geocoding failed for ({lat}, {lon})");
        return RecordOutcome::GeocodingFailed;
    };

    let city = address.city();
    let state = address.state();
    record.enrichment.set_address(city, state);

    if city.is_empty() || state.is_empty() {
        log::info!("[{idx}] city/state not resolved for ({lat}, {lon})");
        return RecordOutcome::AddressIncomplete;
    }

    let state_abbr: String = state.chars().take(2).collect();
    match lookups.registry.lookup_municipality(city, &state_abbr).await {
        Some(entry) => {
            record.enrichment.apply_municipality(&entry);
            log::info!(
                "[{idx}] {city}, {state} -> {} ({})",
                entry.name,
                entry.id
            );
            RecordOutcome::Enriched
        }
        None => {
            log::info!("[{idx}] no municipality found for {city}, {state_abbr}");
            RecordOutcome::MunicipalityNotFound
        }
    }
}

/// Sleeps for `delay` in [`DELAY_TICK`] steps, blocking while paused.
///
/// Returns `false` if the run was cancelled before the delay ran out.
pub async fn inter_batch_delay(delay: Duration, control: &RunControl) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if !control.checkpoint().await {
            return false;
        }
        let step = remaining.min(DELAY_TICK);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    !control.is_cancelled()
}

fn status_label(control: &RunControl) -> &'static str {
    if control.is_cancelled() {
        "Cancelling"
    } else if control.is_paused() {
        "Paused"
    } else {
        "Running"
    }
}
