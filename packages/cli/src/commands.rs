//! Line commands read from stdin while a run is in progress.

use std::io::BufRead as _;

use geo_enrich_engine::RunControl;
use geo_enrich_engine::eta::format_eta;
use tokio::sync::mpsc;

/// A control-plane command typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Toggle,
    Cancel,
    Status,
}

impl Command {
    /// Parses one input line. Blank or unknown lines yield `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            "t" | "toggle" => Some(Self::Toggle),
            "c" | "cancel" => Some(Self::Cancel),
            "s" | "status" => Some(Self::Status),
            _ => None,
        }
    }
}

pub const HELP: &str = "Commands: p|pause, r|resume, t|toggle, c|cancel, s|status";

/// Reads stdin on a dedicated thread and forwards parsed commands.
///
/// The thread exits at EOF or once the receiver is dropped.
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(cmd) => {
                    if tx.send(cmd).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => log::warn!("Unknown command {:?}. {HELP}", line.trim()),
            }
        }
    });
}

/// Applies `cmd` to the running job.
pub fn apply(cmd: Command, control: &RunControl) {
    match cmd {
        Command::Pause => {
            if control.pause() {
                log::info!("Paused");
            }
        }
        Command::Resume => {
            if control.resume() {
                log::info!("Resumed");
            }
        }
        Command::Toggle => {
            if control.toggle_pause() {
                log::info!("Paused");
            } else {
                log::info!("Resumed");
            }
        }
        Command::Cancel => {
            log::info!("Cancelling after the current record...");
            control.cancel();
        }
        Command::Status => {
            let snap = control.snapshot();
            let state = if snap.cancelled {
                "cancelling"
            } else if snap.paused {
                "paused"
            } else {
                "running"
            };
            log::info!(
                "{}/{} records ({:.1}%), {state}, ETA {}",
                snap.processed,
                snap.total,
                snap.percent,
                format_eta(snap.eta)
            );
        }
    }
}
