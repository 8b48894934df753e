//! Run lifecycle: start, background worker, and guaranteed persistence.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt as _;
use geo_enrich_models::{Dataset, OutputFormat};
use geo_enrich_sink::SinkError;
use tokio::task::{JoinError, JoinHandle};

use crate::EngineError;
use crate::batch::{BatchSettings, LoopExit, Lookups, OutcomeCounts, process_dataset};
use crate::control::RunControl;
use crate::eta::{format_eta, format_hms};
use crate::progress::ProgressCallback;

/// Where and how the dataset is written when the run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// Output path or basename; the extension is normalized to `format`.
    pub path: String,
    pub format: OutputFormat,
}

/// Everything a run needs besides the dataset itself.
pub struct RunJob {
    pub settings: BatchSettings,
    pub lookups: Lookups,
    pub output: OutputTarget,
    pub progress: Arc<dyn ProgressCallback>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    Cancelled,
    /// The worker hit an unrecoverable error. Partial results were still
    /// persisted.
    Failed(String),
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Summary handed back to the control plane when a run ends.
#[derive(Debug)]
pub struct RunReport {
    pub state: TerminalState,
    pub processed: u64,
    pub total: u64,
    pub outcomes: OutcomeCounts,
    /// Path written, or why persisting failed.
    pub output: Result<PathBuf, SinkError>,
    pub elapsed: Duration,
    /// The dataset as persisted, enriched up to where the run stopped.
    pub dataset: Dataset,
}

impl RunReport {
    /// `true` when the run completed or was cancelled and the output was
    /// written.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.state, TerminalState::Failed(_)) && self.output.is_ok()
    }
}

/// Starts runs and keeps at most one of them active at a time.
#[derive(Debug, Clone, Default)]
pub struct BatchSession {
    active: Arc<AtomicBool>,
}

/// Clears the session's active flag when the worker finishes, however it
/// finishes.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a run is running or paused.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Spawns the worker for `dataset` on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`EngineError::EmptyDataset`] if there are no records
    /// * [`EngineError::AlreadyRunning`] if another run is still active
    pub fn start(&self, dataset: Dataset, job: RunJob) -> Result<RunHandle, EngineError> {
        if dataset.is_empty() {
            return Err(EngineError::EmptyDataset);
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }

        let guard = ActiveGuard(Arc::clone(&self.active));
        let control = Arc::new(RunControl::new(dataset.len() as u64));
        let task = tokio::spawn(execute(dataset, job, Arc::clone(&control), guard));

        Ok(RunHandle { control, task })
    }
}

/// Control-plane handle to a running job.
pub struct RunHandle {
    control: Arc<RunControl>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Shared run state, for readers that outlive this handle.
    #[must_use]
    pub fn control(&self) -> Arc<RunControl> {
        Arc::clone(&self.control)
    }

    pub fn pause(&self) -> bool {
        self.control.pause()
    }

    pub fn resume(&self) -> bool {
        self.control.resume()
    }

    pub fn toggle_pause(&self) -> bool {
        self.control.toggle_pause()
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Waits for the worker to finish and persist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Worker`] if the worker task was aborted.
    pub async fn wait(self) -> Result<RunReport, EngineError> {
        Ok(self.task.await?)
    }
}

/// Runs the loop, then persists exactly once regardless of how the loop
/// ended.
async fn execute(
    mut dataset: Dataset,
    job: RunJob,
    control: Arc<RunControl>,
    _active: ActiveGuard,
) -> RunReport {
    let total = control.total();
    job.progress.set_total(total);
    job.progress
        .set_message(format!("Running | ETA {}", format_eta(None)));
    log::info!(
        "Starting run over {total} records (batch size {}, delay {:?})",
        job.settings.batch_size,
        job.settings.delay
    );

    let mut outcomes = OutcomeCounts::default();
    let exit = AssertUnwindSafe(process_dataset(
        &mut dataset,
        &job.settings,
        &job.lookups,
        &control,
        job.progress.as_ref(),
        &mut outcomes,
    ))
    .catch_unwind()
    .await;

    let state = match exit {
        Ok(LoopExit::Completed) => TerminalState::Completed,
        Ok(LoopExit::Cancelled) => {
            log::info!(
                "Run cancelled after {}/{total} records",
                control.processed()
            );
            TerminalState::Cancelled
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            log::error!(
                "Run failed after {}/{total} records: {reason}",
                control.processed()
            );
            TerminalState::Failed(reason)
        }
    };

    let (dataset, output) = persist_blocking(dataset, job.output.clone()).await;
    if let Err(e) = &output {
        log::error!("Failed to save results to {}: {e}", job.output.path);
    }

    let elapsed = control.elapsed();
    job.progress.finish(format!(
        "{state}: {}/{total} records in {}",
        control.processed(),
        format_hms(elapsed)
    ));

    RunReport {
        state,
        processed: control.processed(),
        total,
        outcomes,
        output,
        elapsed,
        dataset,
    }
}

/// Writes `dataset` on the blocking pool and hands it back with the
/// result.
async fn persist_blocking(
    dataset: Dataset,
    output: OutputTarget,
) -> (Dataset, Result<PathBuf, SinkError>) {
    let dataset = Arc::new(dataset);
    let shared = Arc::clone(&dataset);
    let result = tokio::task::spawn_blocking(move || {
        geo_enrich_sink::persist(&shared, &output.path, output.format)
    })
    .await
    .unwrap_or_else(|e| Err(writer_task_error(&e)));

    // The task's clone is dropped by the time it has been joined.
    let dataset = Arc::try_unwrap(dataset).unwrap_or_else(|shared| (*shared).clone());
    (dataset, result)
}

fn writer_task_error(e: &JoinError) -> SinkError {
    SinkError::Task(e.to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}
