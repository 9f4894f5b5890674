//! Case discovery.
//!
//! The walk is two levels deep at most (`root/Domain/Case`) and never enters a
//! directory once it has been classified as a case, so the cost of a scan
//! tracks the number of cases rather than the output they have accumulated.

use std::ffi::OsStr;
use std::path::Path;

use cw_core::{Case, CaseId, GuardError, PathGuard, Sanitized};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::artifacts::ArtifactFilter;
use crate::{RepoError, RepoResult};

pub const DEFAULT_DESCRIPTOR: &str = "Makefile";

#[derive(Debug, Clone)]
pub struct CaseScanner {
    guard: PathGuard,
    descriptor: String,
    filter: ArtifactFilter,
}

impl CaseScanner {
    pub fn new(guard: PathGuard) -> Self {
        Self {
            guard,
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
            filter: ArtifactFilter::default(),
        }
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn with_filter(mut self, filter: ArtifactFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    /// Lazily yield cases in filesystem order.
    pub fn walk(&self) -> CaseWalk<'_> {
        let inner = WalkDir::new(self.guard.root())
            .min_depth(1)
            .max_depth(2)
            .follow_links(true)
            .into_iter();
        CaseWalk {
            scanner: self,
            inner,
            visited: 0,
        }
    }

    /// All cases, ordered by domain then name. Identical trees always give
    /// identical sequences regardless of directory iteration order.
    pub fn list_cases(&self) -> Vec<Case> {
        let mut cases: Vec<Case> = self.walk().collect();
        cases.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        debug!(count = cases.len(), "case inventory complete");
        cases
    }

    /// Resolve one id without scanning the whole root.
    pub fn find(&self, id: &CaseId) -> RepoResult<Case> {
        let not_found = || RepoError::CaseNotFound {
            case_id: id.to_string(),
        };

        let hidden = id
            .as_str()
            .split('/')
            .any(|segment| segment.starts_with('.') || self.filter.is_artifact_dir(OsStr::new(segment)));
        if hidden {
            return Err(not_found());
        }

        let path = match self.guard.resolve_case_dir(id.to_relative_path()) {
            Ok(path) => path,
            Err(GuardError::NotFound { .. }) => return Err(not_found()),
            Err(err) => return Err(err.into()),
        };

        if !self.is_case_dir(&path) {
            return Err(not_found());
        }
        Ok(Case::new(id.clone(), path))
    }

    fn is_case_dir(&self, dir: &Path) -> bool {
        dir.join(&self.descriptor).is_file()
    }
}

enum Visit {
    Case(Case),
    Descend,
    Prune,
    Skip,
}

/// Streaming case iterator returned by [`CaseScanner::walk`]. Entries that
/// cannot be read or classified are skipped, never reported as errors.
pub struct CaseWalk<'a> {
    scanner: &'a CaseScanner,
    inner: walkdir::IntoIter,
    visited: usize,
}

impl CaseWalk<'_> {
    /// Directory entries examined so far. Bounded by the number of domains
    /// and cases, never by what a case directory contains.
    pub fn visited(&self) -> usize {
        self.visited
    }

    fn classify(&self, entry: &DirEntry) -> Visit {
        if !entry.file_type().is_dir() {
            return Visit::Skip;
        }

        let Some(name) = entry.file_name().to_str() else {
            debug!(path = %entry.path().display(), "skipping non UTF-8 directory name");
            return Visit::Prune;
        };
        if name.starts_with('.') || self.scanner.filter.is_artifact_dir(entry.file_name()) {
            return Visit::Prune;
        }

        if entry.path_is_symlink() && !self.scanner.guard.contains(entry.path()) {
            warn!(path = %Sanitized(&entry.path().to_string_lossy()), "ignored symlink leaving the cases root");
            return Visit::Prune;
        }

        if !self.scanner.is_case_dir(entry.path()) {
            return if entry.depth() == 1 {
                Visit::Descend
            } else {
                Visit::Prune
            };
        }

        let domain = if entry.depth() == 2 {
            entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
        } else {
            None
        };

        let id = match CaseId::from_parts(domain, name) {
            Ok(id) => id,
            Err(err) => {
                debug!(error = %err, "skipping directory with unusable name");
                return Visit::Prune;
            }
        };

        match self.scanner.guard.resolve(entry.path()) {
            Ok(path) => Visit::Case(Case::new(id, path)),
            Err(err) => {
                debug!(case = %Sanitized(id.as_str()), error = %err, "skipping unresolvable case");
                Visit::Prune
            }
        }
    }
}

impl Iterator for CaseWalk<'_> {
    type Item = Case;

    fn next(&mut self) -> Option<Case> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => {
                    self.visited += 1;
                    entry
                }
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };

            match self.classify(&entry) {
                Visit::Case(case) => {
                    // Cases are leaves: never list their contents.
                    self.inner.skip_current_dir();
                    return Some(case);
                }
                Visit::Prune => self.inner.skip_current_dir(),
                Visit::Descend | Visit::Skip => {}
            }
        }
    }
}
