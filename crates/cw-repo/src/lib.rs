//! cw-repo: the on-disk case repository.
//!
//! Discovery, configuration file access and tree replication for cases under
//! a single guarded root.

pub mod artifacts;
pub mod config_store;
pub mod limits;
pub mod replicate;
pub mod scanner;

pub use artifacts::ArtifactFilter;
pub use config_store::{ConfigDocument, ConfigStore};
pub use limits::RepoLimits;
pub use replicate::CaseReplicator;
pub use scanner::{CaseScanner, CaseWalk};

use cw_core::{CaseIdError, GuardError, NameError};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error(transparent)]
    InvalidId(#[from] CaseIdError),

    #[error("Case not found: {case_id}")]
    CaseNotFound { case_id: String },

    #[error("Config not found for case: {case_id}")]
    ConfigNotFound { case_id: String },

    #[error("Case with this name already exists: {case_id}")]
    AlreadyExists { case_id: String },

    #[error("{what} too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        what: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("Case has too many files: more than {limit}")]
    TooManyFiles { limit: u64 },

    #[error("Invalid content: {0}")]
    Validation(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RepoError::Io {
            context: context.into(),
            source,
        }
    }
}
