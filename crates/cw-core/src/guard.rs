//! Root containment.
//!
//! Every component resolves paths through [`PathGuard`] before it touches the
//! filesystem. Both sides are canonicalized (`..`, `.` and symlinks resolved)
//! and containment is decided component by component with
//! [`Path::starts_with`], so a root named `cases` never admits `cases_other`.

use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::error::{GuardError, GuardResult};
use crate::names::CaseName;
use crate::sanitize::{Sanitized, escape_control, has_forbidden_chars};

/// Canonical cases root. Holds no other state; cloning is cheap enough to
/// hand one to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl AsRef<Path>) -> GuardResult<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|source| GuardError::Root {
            root: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` (absolute, or relative to the root) to a canonical
    /// path inside the root. The root itself is accepted.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> GuardResult<PathBuf> {
        let candidate = candidate.as_ref();
        let shown = candidate.to_string_lossy();

        if has_forbidden_chars(&shown) {
            warn!(path = %Sanitized(&shown), "rejected path with control characters");
            return Err(GuardError::InvalidCharacters {
                path: escape_control(&shown).into_owned(),
            });
        }

        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let canonical = match joined.canonicalize() {
            Ok(path) => path,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // A missing target is only "not found" if it would have been
                // inside the root; otherwise it is still an escape attempt.
                if is_contained(&self.root, &resolve_missing(&joined)) {
                    return Err(GuardError::NotFound {
                        path: escape_control(&shown).into_owned(),
                    });
                }
                warn!(path = %Sanitized(&shown), "access denied for path outside root");
                return Err(GuardError::OutsideRoot {
                    path: escape_control(&shown).into_owned(),
                });
            }
            Err(source) => {
                return Err(GuardError::Unresolvable {
                    path: escape_control(&shown).into_owned(),
                    source,
                });
            }
        };

        if !is_contained(&self.root, &canonical) {
            warn!(path = %Sanitized(&shown), "access denied for path outside root");
            return Err(GuardError::OutsideRoot {
                path: escape_control(&shown).into_owned(),
            });
        }

        Ok(canonical)
    }

    /// Like [`resolve`](Self::resolve) but refuses the root directory itself,
    /// for operations that act on a single case.
    pub fn resolve_case_dir(&self, candidate: impl AsRef<Path>) -> GuardResult<PathBuf> {
        let resolved = self.resolve(candidate)?;
        if resolved == self.root {
            warn!("attempted operation on the cases root itself");
            return Err(GuardError::RootItself);
        }
        Ok(resolved)
    }

    /// Resolve a not-yet-existing direct child `name` of the existing
    /// directory `parent`.
    pub fn resolve_child(&self, parent: impl AsRef<Path>, name: &CaseName) -> GuardResult<PathBuf> {
        let parent = self.resolve(parent)?;
        let child = parent.join(name.as_str());
        if !is_contained(&self.root, &child) {
            return Err(GuardError::OutsideRoot {
                path: escape_control(&child.to_string_lossy()).into_owned(),
            });
        }
        Ok(child)
    }

    /// Containment test that never errors; unresolvable paths are not
    /// contained.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref()
            .canonicalize()
            .map(|canonical| is_contained(&self.root, &canonical))
            .unwrap_or(false)
    }

    /// Strip the root prefix from an already-resolved path.
    pub fn relative<'a>(&self, resolved: &'a Path) -> Option<&'a Path> {
        resolved.strip_prefix(&self.root).ok()
    }
}

/// One-shot form: canonicalize `root`, then resolve `candidate` against it.
pub fn resolve(root: &Path, candidate: &Path) -> GuardResult<PathBuf> {
    PathGuard::new(root)?.resolve(candidate)
}

/// Component-wise containment of two already-canonical paths.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

/// Best resolution of a path that does not exist: canonicalize its deepest
/// existing ancestor, follow a dangling symlink directly below it, then
/// append the missing tail. An escaping symlink anywhere on the way is
/// therefore seen even when the final target is absent.
fn resolve_missing(path: &Path) -> PathBuf {
    let mut tail = Vec::new();
    let mut existing = path;
    let base = loop {
        if let Ok(canonical) = existing.canonicalize() {
            break canonical;
        }
        let (Some(parent), Some(last)) = (existing.parent(), existing.components().next_back())
        else {
            return lexical_normalize(path);
        };
        tail.push(last.as_os_str());
        existing = parent;
    };

    let mut resolved = base;
    let mut missing = tail.into_iter().rev();
    if let Some(first) = missing.next() {
        let entry = resolved.join(first);
        match std::fs::read_link(&entry) {
            Ok(target) => resolved = resolved.join(target),
            Err(_) => resolved = entry,
        }
    }
    for component in missing {
        resolved.push(component);
    }
    lexical_normalize(&resolved)
}

/// Collapse `.` and `..` without touching the filesystem. Only used to
/// classify paths that do not exist.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
