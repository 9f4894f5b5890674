//! Size bounds enforced by the repository.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONFIG_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_CASE_FILES: u64 = 10_000;
pub const DEFAULT_MAX_CASE_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoLimits {
    /// Largest configuration file read or written.
    pub max_config_bytes: u64,
    /// Most files a duplicate may copy (artifacts excluded).
    pub max_case_files: u64,
    /// Most bytes a duplicate may copy (artifacts excluded).
    pub max_case_bytes: u64,
}

impl Default for RepoLimits {
    fn default() -> Self {
        Self {
            max_config_bytes: DEFAULT_MAX_CONFIG_BYTES,
            max_case_files: DEFAULT_MAX_CASE_FILES,
            max_case_bytes: DEFAULT_MAX_CASE_BYTES,
        }
    }
}
