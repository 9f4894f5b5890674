//! Generated-artifact classification.
//!
//! Each entry costs one set lookup for its name and, for files, one for its
//! extension. Nothing here is a glob; patterns are never matched against
//! every entry.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;

/// Directories holding build or simulation output.
const DEFAULT_DIR_NAMES: &[&str] = &["tmp", "build", "__pycache__"];

/// Exact file names that are always generated.
const DEFAULT_FILE_NAMES: &[&str] = &[".DS_Store"];

/// Extensions of compiled objects, visualisation output, logs and scratch
/// files.
const DEFAULT_EXTENSIONS: &[&str] = &[
    "o", "obj", "d", "a", "so", "dylib", "dll", "exe", "pyc", "vtk", "vti", "vtu", "vtp", "vtm",
    "pvd", "pvtu", "pvti", "ppm", "log", "tmp",
];

#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    dir_names: HashSet<String>,
    file_names: HashSet<String>,
    extensions: HashSet<String>,
}

impl Default for ArtifactFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DIR_NAMES, DEFAULT_FILE_NAMES, DEFAULT_EXTENSIONS)
    }
}

impl ArtifactFilter {
    pub fn new(dir_names: &[&str], file_names: &[&str], extensions: &[&str]) -> Self {
        Self {
            dir_names: dir_names.iter().map(|s| s.to_string()).collect(),
            file_names: file_names.iter().map(|s| s.to_string()).collect(),
            extensions: extensions
                .iter()
                .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// True for a directory name that only ever holds generated output.
    pub fn is_artifact_dir(&self, name: &OsStr) -> bool {
        name.to_str().is_some_and(|n| self.dir_names.contains(n))
    }

    /// True for a file whose exact name or extension marks it as generated.
    pub fn is_artifact_file(&self, name: &OsStr) -> bool {
        let Some(name) = name.to_str() else {
            return false;
        };
        if self.file_names.contains(name) {
            return true;
        }
        match Path::new(name).extension().and_then(OsStr::to_str) {
            Some(ext) if ext.bytes().any(|b| b.is_ascii_uppercase()) => {
                self.extensions.contains(&ext.to_ascii_lowercase())
            }
            Some(ext) => self.extensions.contains(ext),
            None => false,
        }
    }

    pub fn is_artifact(&self, name: &OsStr, is_dir: bool) -> bool {
        if is_dir {
            self.is_artifact_dir(name)
        } else {
            self.is_artifact_file(name)
        }
    }
}
