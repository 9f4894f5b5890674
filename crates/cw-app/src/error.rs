//! Error types for the cw-app service layer.

use std::path::PathBuf;

use cw_core::{CaseIdError, GuardError};
use cw_repo::RepoError;
use cw_runner::RunnerError;
use serde::Serialize;

/// What went wrong, independent of which component noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PathSecurity,
    Validation,
    NotFound,
    TooLarge,
    Busy,
    TimedOut,
    FailedToStart,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PathSecurity => "path_security",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::Busy => "busy",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::FailedToStart => "failed_to_start",
            ErrorKind::Io => "io",
        }
    }
}

/// Application error wrapping the backend crates' errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    InvalidId(#[from] CaseIdError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("Failed to read settings file: {path}")]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings file: {path}")]
    SettingsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cw-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Guard(err) => guard_kind(err),
            AppError::InvalidId(_) | AppError::Settings(_) => ErrorKind::Validation,
            AppError::Repo(err) => repo_kind(err),
            AppError::Runner(err) => runner_kind(err),
            AppError::SettingsRead { .. } | AppError::SettingsWrite { .. } | AppError::Io(_) => {
                ErrorKind::Io
            }
        }
    }
}

fn guard_kind(err: &GuardError) -> ErrorKind {
    match err {
        GuardError::InvalidCharacters { .. } => ErrorKind::Validation,
        GuardError::NotFound { .. } => ErrorKind::NotFound,
        GuardError::OutsideRoot { .. }
        | GuardError::RootItself
        | GuardError::Unresolvable { .. } => ErrorKind::PathSecurity,
        GuardError::Root { .. } => ErrorKind::Io,
    }
}

fn repo_kind(err: &RepoError) -> ErrorKind {
    match err {
        RepoError::Guard(err) => guard_kind(err),
        RepoError::InvalidName(_)
        | RepoError::InvalidId(_)
        | RepoError::AlreadyExists { .. }
        | RepoError::Validation(_) => ErrorKind::Validation,
        RepoError::CaseNotFound { .. } | RepoError::ConfigNotFound { .. } => ErrorKind::NotFound,
        RepoError::TooLarge { .. } | RepoError::TooManyFiles { .. } => ErrorKind::TooLarge,
        RepoError::Io { .. } => ErrorKind::Io,
    }
}

fn runner_kind(err: &RunnerError) -> ErrorKind {
    match err {
        RunnerError::Guard(err) => guard_kind(err),
        RunnerError::CaseNotFound { .. } => ErrorKind::NotFound,
        RunnerError::Busy => ErrorKind::Busy,
        RunnerError::TimedOut { .. } => ErrorKind::TimedOut,
        RunnerError::FailedToStart { .. } => ErrorKind::FailedToStart,
        RunnerError::InvalidCommand(_) => ErrorKind::Validation,
        RunnerError::Io { .. } => ErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_core::NameError;

    #[test]
    fn taxonomy_is_preserved_through_wrapping() {
        let cases = [
            (AppError::from(GuardError::RootItself), ErrorKind::PathSecurity),
            (
                AppError::from(RepoError::Guard(GuardError::OutsideRoot {
                    path: "../x".to_string(),
                })),
                ErrorKind::PathSecurity,
            ),
            (
                AppError::from(RepoError::InvalidName(NameError::Empty)),
                ErrorKind::Validation,
            ),
            (
                AppError::from(RepoError::AlreadyExists {
                    case_id: "Fluid/a".to_string(),
                }),
                ErrorKind::Validation,
            ),
            (
                AppError::from(RepoError::ConfigNotFound {
                    case_id: "Fluid/a".to_string(),
                }),
                ErrorKind::NotFound,
            ),
            (
                AppError::from(RepoError::TooManyFiles { limit: 1 }),
                ErrorKind::TooLarge,
            ),
            (AppError::from(RunnerError::Busy), ErrorKind::Busy),
            (
                AppError::from(RunnerError::CaseNotFound {
                    case_id: "Fluid/a".to_string(),
                }),
                ErrorKind::NotFound,
            ),
            (AppError::Settings("x".to_string()), ErrorKind::Validation),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn busy_message_is_user_facing() {
        assert_eq!(
            AppError::from(RunnerError::Busy).to_string(),
            "Another build or run is already in progress"
        );
    }
}
