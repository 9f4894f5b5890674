//! Environment passed to child processes.
//!
//! Children start from an empty environment and only receive variables that
//! are explicitly allowed by name or by prefix, so service secrets never
//! reach a build.

use std::collections::HashSet;
use std::ffi::OsString;
use std::process::Command;

pub const DEFAULT_ALLOWED_VARS: &[&str] = &[
    "PATH",
    "LANG",
    "LC_ALL",
    "TERM",
    "LD_LIBRARY_PATH",
    "HOME",
    "USER",
    "SHELL",
    "TMPDIR",
];

pub const DEFAULT_ALLOWED_PREFIXES: &[&str] = &["CW_"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPolicy {
    allowed: HashSet<String>,
    prefixes: Vec<String>,
}

impl Default for EnvPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_VARS.iter().copied(),
            DEFAULT_ALLOWED_PREFIXES.iter().copied(),
        )
    }
}

impl EnvPolicy {
    pub fn new<N, P>(allowed: N, prefixes: P) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, key: &str) -> bool {
        self.allowed.contains(key) || self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Keep the allowed subset of `vars`. Keys that are not valid UTF-8 are
    /// always dropped.
    pub fn filter<I>(&self, vars: I) -> Vec<(OsString, OsString)>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        vars.into_iter()
            .filter(|(key, _)| key.to_str().is_some_and(|k| self.allows(k)))
            .collect()
    }

    /// Replace the command's environment with the allowed part of ours.
    pub fn apply(&self, cmd: &mut Command) {
        cmd.env_clear();
        cmd.envs(self.filter(std::env::vars_os()));
    }
}
