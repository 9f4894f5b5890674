//! Shared service layer for casework frontends.
//!
//! Wires the case repository and the process runner to one guarded root and
//! one admission gate, and maps every backend failure onto a small closed set
//! of error kinds.

pub mod case_service;
pub mod error;
pub mod settings;

pub use case_service::CaseService;
pub use error::{AppError, AppResult, ErrorKind};
pub use settings::{RunnerSettings, Settings};

pub use cw_core::{Case, CaseId};
pub use cw_repo::{ConfigDocument, RepoLimits};
pub use cw_runner::{RunCause, RunKind, RunPhase, RunProgressEvent, RunResult};
