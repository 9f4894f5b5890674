use std::path::PathBuf;
use thiserror::Error;

pub type GuardResult<T> = Result<T, GuardError>;

/// Containment failures. Paths embedded in messages are already escaped.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Invalid characters in path: {path}")]
    InvalidCharacters { path: String },

    #[error("Access denied: {path} is outside the cases root")]
    OutsideRoot { path: String },

    #[error("Access denied: cannot operate on the cases root itself")]
    RootItself,

    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Cannot resolve cases root {root}: {source}")]
    Root {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot resolve path {path}: {source}")]
    Unresolvable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Invalid name: name must not be empty")]
    Empty,

    #[error("Invalid name: {len} bytes exceeds the {max} byte limit")]
    TooLong { len: usize, max: usize },

    #[error("Invalid name: {name}. Use alphanumeric, underscore, and hyphen only.")]
    InvalidCharacters { name: String },

    #[error("Invalid name: {name} is a reserved system name")]
    Reserved { name: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseIdError {
    #[error("Case id must not be empty")]
    Empty,

    #[error("Case id is too long ({len} bytes, limit {max})")]
    TooLong { len: usize, max: usize },

    #[error("Invalid characters in case id: {id}")]
    InvalidCharacters { id: String },

    #[error("Case id must be relative: {id}")]
    Absolute { id: String },

    #[error("Case id must not contain parent-directory segments: {id}")]
    ParentSegment { id: String },

    #[error("Malformed case id: {id}")]
    Malformed { id: String },
}
