//! Shared run state between the control plane and the batch worker.
//!
//! The worker only consults [`RunControl`] at checkpoints: before each
//! batch, before each record, and on every tick of the inter-batch delay.
//! It never interrupts an in-flight lookup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::eta::estimate_remaining;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Signals {
    paused: bool,
    cancel_requested: bool,
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: u64,
    /// `processed / total * 100`, or 0 for an empty run.
    pub percent: f64,
    /// `None` until the first record has been processed.
    pub eta: Option<Duration>,
    pub paused: bool,
    pub cancelled: bool,
}

/// Pause/cancel signals and progress counters for one run.
#[derive(Debug)]
pub struct RunControl {
    signals: watch::Sender<Signals>,
    processed: AtomicU64,
    total: u64,
    started_at: Instant,
}

impl RunControl {
    /// Creates the state for a run over `total` records, starting the
    /// clock now.
    #[must_use]
    pub fn new(total: u64) -> Self {
        let (signals, _) = watch::channel(Signals::default());
        Self {
            signals,
            processed: AtomicU64::new(0),
            total,
            started_at: Instant::now(),
        }
    }

    /// Requests a pause. Returns `false` if already paused.
    pub fn pause(&self) -> bool {
        self.signals.send_if_modified(|s| !std::mem::replace(&mut s.paused, true))
    }

    /// Resumes a paused run. Returns `false` if it was not paused.
    pub fn resume(&self) -> bool {
        self.signals.send_if_modified(|s| std::mem::replace(&mut s.paused, false))
    }

    /// Flips the pause signal and returns the new state (`true` = paused).
    pub fn toggle_pause(&self) -> bool {
        let mut paused = false;
        self.signals.send_modify(|s| {
            s.paused = !s.paused;
            paused = s.paused;
        });
        paused
    }

    /// Requests cancellation. Also wakes a worker blocked on pause.
    pub fn cancel(&self) {
        self.signals.send_modify(|s| s.cancel_requested = true);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.signals.borrow().paused
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signals.borrow().cancel_requested
    }

    /// Blocks until the run is resumed or cancelled. Returns immediately
    /// when not paused.
    pub async fn wait_while_paused(&self) {
        let mut rx = self.signals.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| !s.paused || s.cancel_requested).await;
    }

    /// Worker checkpoint: returns `false` if the run is cancelled,
    /// otherwise waits out any pause and reports whether work may
    /// continue.
    pub async fn checkpoint(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.wait_while_paused().await;
        !self.is_cancelled()
    }

    /// Counts one more processed record and returns the new count.
    pub fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Percentage of records processed; 0 for an empty run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed() as f64 / self.total as f64 * 100.0
    }

    /// Estimated time to finish, `None` before the first record.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        estimate_remaining(self.elapsed(), self.processed(), self.total)
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let signals = *self.signals.borrow();
        ProgressSnapshot {
            processed: self.processed(),
            total: self.total,
            percent: self.percent(),
            eta: self.eta(),
            paused: signals.paused,
            cancelled: signals.cancel_requested,
        }
    }
}
