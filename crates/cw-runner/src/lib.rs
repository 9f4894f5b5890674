//! cw-runner: build and run commands executed inside case directories.
//!
//! Contains:
//! - gate (admission control, one heavy process at a time)
//! - env (environment allow-list for children)
//! - capture (bounded stdout/stderr draining)
//! - runner (spawn, bounded wait, kill on timeout)

pub mod capture;
pub mod env;
pub mod gate;
pub mod runner;

pub use capture::{CapturedText, DEFAULT_OUTPUT_LIMIT, TRUNCATION_MARKER};
pub use env::EnvPolicy;
pub use gate::{AdmissionGate, SingleSlotGate, SlotPermit};
pub use runner::{
    CommandSpec, CommandTable, ProcessRunner, RunCause, RunKind, RunPhase, RunProgressEvent,
    RunRequest, RunResult,
};

use cw_core::GuardError;

pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("Case not found: {case_id}")]
    CaseNotFound { case_id: String },

    #[error("Another build or run is already in progress")]
    Busy,

    #[error("{} timed out after {} s for case {}", .partial.kind, .partial.timeout_s, .partial.case_id)]
    TimedOut { partial: Box<RunResult> },

    #[error("{} failed to start for case {}: {reason}", .partial.kind, .partial.case_id)]
    FailedToStart {
        reason: String,
        partial: Box<RunResult>,
    },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Output captured before the run ended, when there was a run at all.
    pub fn partial(&self) -> Option<&RunResult> {
        match self {
            RunnerError::TimedOut { partial } | RunnerError::FailedToStart { partial, .. } => {
                Some(partial)
            }
            _ => None,
        }
    }
}
