//! Per-case configuration file access.
//!
//! Reads are bounded by the size reported by the open handle, so a file that
//! is swapped between a size check and the open cannot slip past the limit.
//! Writes go to an unpredictable sibling temp file which is fsynced and then
//! renamed over the target; readers see the old file or the new one, never a
//! mix. The previous file's permission bits are carried onto the replacement.

use std::fs::{self, File, Metadata, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use cw_core::{Case, CaseId, GuardError, PathGuard, Sanitized};
use serde::Serialize;
use tracing::{info, warn};

use crate::limits::RepoLimits;
use crate::{RepoError, RepoResult};

pub const DEFAULT_CONFIG_FILE: &str = "config.xml";

/// A configuration file as read from disk. Replaced wholesale on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDocument {
    pub case_id: CaseId,
    pub content: String,
    pub len: u64,
    /// Permission bits at read time; `None` where the platform has none.
    pub mode: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    guard: PathGuard,
    file_name: String,
    max_bytes: u64,
}

impl ConfigStore {
    pub fn new(guard: PathGuard, limits: &RepoLimits) -> Self {
        Self {
            guard,
            file_name: DEFAULT_CONFIG_FILE.to_string(),
            max_bytes: limits.max_config_bytes,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn read(&self, case: &Case) -> RepoResult<ConfigDocument> {
        let (_, path) = self.locate(case)?;
        let path = self.resolve_existing(case, &path)?;

        let mut file = match open_for_read(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(case = %Sanitized(case.id.as_str()), "config not found");
                return Err(RepoError::ConfigNotFound {
                    case_id: case.id.to_string(),
                });
            }
            Err(err) => return Err(RepoError::io("opening config", err)),
        };

        let metadata = file
            .metadata()
            .map_err(|e| RepoError::io("inspecting config", e))?;
        if !metadata.is_file() {
            warn!(case = %Sanitized(case.id.as_str()), "config path is not a regular file");
            return Err(RepoError::Validation(
                "config path is not a regular file".to_string(),
            ));
        }

        let size = metadata.len();
        if size > self.max_bytes {
            warn!(case = %Sanitized(case.id.as_str()), size, limit = self.max_bytes, "config file too large");
            return Err(RepoError::TooLarge {
                what: "Config file",
                size,
                limit: self.max_bytes,
            });
        }

        // The file may grow after the metadata call; never read past the limit.
        let mut content = String::with_capacity(size as usize);
        (&mut file)
            .take(self.max_bytes + 1)
            .read_to_string(&mut content)
            .map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => {
                    RepoError::Validation("config file is not valid UTF-8".to_string())
                }
                _ => RepoError::io("reading config", e),
            })?;

        let len = content.len() as u64;
        if len > self.max_bytes {
            return Err(RepoError::TooLarge {
                what: "Config file",
                size: len,
                limit: self.max_bytes,
            });
        }

        Ok(ConfigDocument {
            case_id: case.id.clone(),
            content,
            len,
            mode: file_mode(&metadata),
        })
    }

    pub fn write(&self, case: &Case, content: &str) -> RepoResult<()> {
        let len = content.len() as u64;
        if len > self.max_bytes {
            return Err(RepoError::Validation(format!(
                "content size {len} bytes exceeds the {} byte limit",
                self.max_bytes
            )));
        }
        if contains_markup_declaration(content) {
            return Err(RepoError::Validation(
                "XML document type and entity declarations are not allowed".to_string(),
            ));
        }

        let (dir, path) = self.locate(case)?;

        let previous = match fs::symlink_metadata(&path) {
            Ok(metadata) => Some(metadata),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(RepoError::io("inspecting config", err)),
        };
        if let Some(metadata) = &previous
            && !metadata.is_file()
        {
            return Err(RepoError::Validation(
                "existing config is not a regular file".to_string(),
            ));
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.file_name))
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| RepoError::io("creating temporary config", e))?;

        let permissions = match &previous {
            Some(metadata) => metadata.permissions(),
            None => new_file_permissions(tmp.as_file())
                .map_err(|e| RepoError::io("inspecting temporary config", e))?,
        };
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| RepoError::io("setting config permissions", e))?;

        tmp.as_file_mut()
            .write_all(content.as_bytes())
            .map_err(|e| RepoError::io("writing temporary config", e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| RepoError::io("syncing temporary config", e))?;

        // On error the temp file is still owned by the returned handle and is
        // removed when it drops.
        tmp.persist(&path)
            .map_err(|e| RepoError::io("replacing config", e.error))?;

        info!(case = %Sanitized(case.id.as_str()), bytes = len, "config saved");
        Ok(())
    }

    fn locate(&self, case: &Case) -> RepoResult<(PathBuf, PathBuf)> {
        let dir = self
            .guard
            .resolve_case_dir(&case.path)
            .map_err(|err| match err {
                GuardError::NotFound { .. } => RepoError::CaseNotFound {
                    case_id: case.id.to_string(),
                },
                other => other.into(),
            })?;
        let path = dir.join(&self.file_name);
        Ok((dir, path))
    }

    /// Canonical location of an existing config file. A config symlinked to a
    /// target outside the root is refused like any other escape.
    fn resolve_existing(&self, case: &Case, path: &Path) -> RepoResult<PathBuf> {
        self.guard.resolve(path).map_err(|err| match err {
            GuardError::NotFound { .. } => {
                info!(case = %Sanitized(case.id.as_str()), "config not found");
                RepoError::ConfigNotFound {
                    case_id: case.id.to_string(),
                }
            }
            other => other.into(),
        })
    }
}

/// `<!DOCTYPE` or `<!ENTITY`, any case, optional whitespace after `<!`.
fn contains_markup_declaration(content: &str) -> bool {
    content.match_indices("<!").any(|(pos, _)| {
        let rest = content[pos + 2..].trim_start();
        ["DOCTYPE", "ENTITY"].iter().any(|keyword| {
            rest.get(..keyword.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
        })
    })
}

#[cfg(unix)]
fn open_for_read(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    use nix::fcntl::OFlag;

    // Non-blocking so a FIFO at the config path cannot stall the open. The
    // path is already canonical, so a symlink here was swapped in afterwards.
    OpenOptions::new()
        .read(true)
        .custom_flags((OFlag::O_NONBLOCK | OFlag::O_NOFOLLOW).bits())
        .open(path)
}

#[cfg(not(unix))]
fn open_for_read(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

#[cfg(unix)]
fn new_file_permissions(_file: &File) -> io::Result<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions(file: &File) -> io::Result<Permissions> {
    Ok(file.metadata()?.permissions())
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata) -> Option<u32> {
    None
}
