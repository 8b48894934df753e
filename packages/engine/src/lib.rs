#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch enrichment engine for geo-enrich.
//!
//! A [`BatchSession`] runs one job at a time on a background Tokio task.
//! The job walks the dataset sequentially in fixed-size batches: each
//! record is reverse-geocoded and, when both city and state resolve,
//! matched against the municipality registry. Between batches the worker
//! sleeps to respect the external services' rate limits.
//!
//! The control plane drives the run through a [`RunHandle`] (pause,
//! resume, cancel) and reads progress from the shared [`RunControl`].
//! Whatever way the run ends, the dataset is persisted exactly once
//! before the [`RunReport`] is returned.

pub mod batch;
pub mod control;
pub mod eta;
pub mod progress;
pub mod session;

pub use batch::{BatchSettings, Lookups, OutcomeCounts, RecordOutcome};
pub use control::{ProgressSnapshot, RunControl};
pub use session::{BatchSession, OutputTarget, RunHandle, RunJob, RunReport, TerminalState};

use thiserror::Error;

/// Errors starting or joining a run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The dataset has no records to process.
    #[error("Dataset has no records")]
    EmptyDataset,

    /// Another run is still running or paused.
    #[error("A run is already in progress")]
    AlreadyRunning,

    /// The worker task was aborted before producing a report.
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
