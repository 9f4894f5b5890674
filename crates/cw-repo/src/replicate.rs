//! Case duplication and removal.

use std::ffi::OsStr;
use std::fs::{self, Permissions};
use std::io;
use std::path::{Component, Path, PathBuf};

use cw_core::{Case, CaseId, CaseName, GuardError, PathGuard, Sanitized};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::artifacts::ArtifactFilter;
use crate::limits::RepoLimits;
use crate::{RepoError, RepoResult};

#[derive(Debug, Clone)]
pub struct CaseReplicator {
    guard: PathGuard,
    filter: ArtifactFilter,
    limits: RepoLimits,
}

impl CaseReplicator {
    pub fn new(guard: PathGuard, limits: &RepoLimits) -> Self {
        Self {
            guard,
            filter: ArtifactFilter::default(),
            limits: *limits,
        }
    }

    pub fn with_filter(mut self, filter: ArtifactFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Copy `source` to a sibling directory called `new_name`, leaving out
    /// generated artifacts, symlinks and special files.
    pub fn duplicate(&self, source: &Case, new_name: &str) -> RepoResult<Case> {
        let name = CaseName::parse(new_name)?;
        // The scanner prunes these names, so such a copy could never be
        // listed or removed again.
        if self.filter.is_artifact_dir(OsStr::new(name.as_str())) {
            return Err(RepoError::Validation(format!(
                "'{}' is reserved for generated output",
                name.as_str()
            )));
        }
        let source_dir = self.case_dir(source)?;

        let parent = source_dir
            .parent()
            .ok_or_else(|| RepoError::Validation("case has no parent directory".to_string()))?;
        let target = self.guard.resolve_child(parent, &name)?;
        let new_id = self.id_for(&target)?;

        if fs::symlink_metadata(&target).is_ok() {
            return Err(RepoError::AlreadyExists {
                case_id: new_id.to_string(),
            });
        }

        self.check_limits(&source_dir)?;

        // Claiming the directory is the real existence check; anything that
        // appeared since the lookup above stays untouched.
        match fs::create_dir(&target) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(RepoError::AlreadyExists {
                    case_id: new_id.to_string(),
                });
            }
            Err(err) => return Err(RepoError::io("creating case directory", err)),
        }

        if let Err(err) = self.copy_tree(&source_dir, &target) {
            error!(case = %Sanitized(new_id.as_str()), error = %err, "duplicate failed, removing partial copy");
            if let Err(cleanup) = fs::remove_dir_all(&target) {
                error!(error = %cleanup, "failed to remove partial copy");
            }
            return Err(err);
        }

        info!(
            source = %Sanitized(source.id.as_str()),
            case = %Sanitized(new_id.as_str()),
            "case duplicated"
        );
        Ok(Case::new(new_id, target))
    }

    /// Delete the case directory after re-checking it against the root.
    pub fn remove(&self, case: &Case) -> RepoResult<()> {
        let dir = self.case_dir(case)?;
        fs::remove_dir_all(&dir).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => RepoError::CaseNotFound {
                case_id: case.id.to_string(),
            },
            _ => RepoError::io("deleting case", err),
        })?;
        info!(case = %Sanitized(case.id.as_str()), "case deleted");
        Ok(())
    }

    fn case_dir(&self, case: &Case) -> RepoResult<PathBuf> {
        self.guard
            .resolve_case_dir(&case.path)
            .map_err(|err| match err {
                GuardError::NotFound { .. } => RepoError::CaseNotFound {
                    case_id: case.id.to_string(),
                },
                other => other.into(),
            })
    }

    fn id_for(&self, target: &Path) -> RepoResult<CaseId> {
        let relative = self
            .guard
            .relative(target)
            .ok_or_else(|| RepoError::Validation("target is outside the cases root".to_string()))?;
        let segments: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        Ok(CaseId::parse(&segments.join("/"))?)
    }

    /// Entries worth copying. Artifact directories are pruned whole, so
    /// their contents are never visited.
    fn entries<'a>(
        &'a self,
        source: &Path,
    ) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> + 'a {
        WalkDir::new(source)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| {
                !self
                    .filter
                    .is_artifact(entry.file_name(), entry.file_type().is_dir())
            })
    }

    fn check_limits(&self, source: &Path) -> RepoResult<()> {
        let mut files = 0u64;
        let mut bytes = 0u64;

        for entry in self.entries(source) {
            let entry = entry.map_err(|e| RepoError::io("measuring source case", e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            files += 1;
            if files > self.limits.max_case_files {
                return Err(RepoError::TooManyFiles {
                    limit: self.limits.max_case_files,
                });
            }

            let len = entry
                .metadata()
                .map_err(|e| RepoError::io("measuring source case", e.into()))?
                .len();
            bytes = bytes.saturating_add(len);
            if bytes > self.limits.max_case_bytes {
                return Err(RepoError::TooLarge {
                    what: "Case",
                    size: bytes,
                    limit: self.limits.max_case_bytes,
                });
            }
        }
        Ok(())
    }

    fn copy_tree(&self, source: &Path, target: &Path) -> RepoResult<()> {
        // Directory modes are applied last so a read-only source directory
        // does not block copying its own contents.
        let mut dir_modes: Vec<(PathBuf, Permissions)> = Vec::new();

        for entry in self.entries(source) {
            let entry = entry.map_err(|e| RepoError::io("walking source case", e.into()))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| RepoError::Validation("entry outside source case".to_string()))?;
            let dest = target.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir(&dest).map_err(|e| RepoError::io("creating directory", e))?;
                let metadata = entry
                    .metadata()
                    .map_err(|e| RepoError::io("inspecting directory", e.into()))?;
                dir_modes.push((dest, metadata.permissions()));
            } else if file_type.is_file() {
                fs::copy(entry.path(), &dest).map_err(|e| RepoError::io("copying file", e))?;
            } else {
                debug!(
                    path = %Sanitized(&entry.path().to_string_lossy()),
                    "skipping symlink or special file"
                );
            }
        }

        for (dir, permissions) in dir_modes.into_iter().rev() {
            fs::set_permissions(&dir, permissions)
                .map_err(|e| RepoError::io("setting directory permissions", e))?;
        }
        Ok(())
    }
}
