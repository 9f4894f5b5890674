//! Service settings, loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file) is a complete
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cw_repo::RepoLimits;
use cw_runner::env::{DEFAULT_ALLOWED_PREFIXES, DEFAULT_ALLOWED_VARS};
use cw_runner::{CommandSpec, CommandTable, DEFAULT_OUTPUT_LIMIT, EnvPolicy, RunKind};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_ROOT: &str = "./my_cases";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding every case.
    pub root: PathBuf,
    /// File whose presence marks a directory as a case.
    pub descriptor: String,
    /// Per-case configuration file.
    pub config_file: String,
    pub limits: RepoLimits,
    pub runner: RunnerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            descriptor: cw_repo::scanner::DEFAULT_DESCRIPTOR.to_string(),
            config_file: cw_repo::config_store::DEFAULT_CONFIG_FILE.to_string(),
            limits: RepoLimits::default(),
            runner: RunnerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSettings {
    pub build_command: Vec<String>,
    pub run_command: Vec<String>,
    pub build_timeout_s: u64,
    pub run_timeout_s: u64,
    /// Bytes kept per output stream.
    pub output_limit_bytes: usize,
    pub env_allow: Vec<String>,
    pub env_prefixes: Vec<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            build_command: vec!["make".to_string()],
            run_command: vec!["make".to_string(), "run".to_string()],
            build_timeout_s: RunKind::Build.default_timeout().as_secs(),
            run_timeout_s: RunKind::Run.default_timeout().as_secs(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
            env_allow: DEFAULT_ALLOWED_VARS.iter().map(|s| s.to_string()).collect(),
            env_prefixes: DEFAULT_ALLOWED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RunnerSettings {
    pub fn timeout(&self, kind: RunKind) -> Duration {
        match kind {
            RunKind::Build => Duration::from_secs(self.build_timeout_s),
            RunKind::Run => Duration::from_secs(self.run_timeout_s),
        }
    }

    pub fn command_table(&self) -> AppResult<CommandTable> {
        let build = CommandSpec::from_argv(self.build_command.as_slice())
            .map_err(|e| AppError::Settings(format!("build_command: {e}")))?;
        let run = CommandSpec::from_argv(self.run_command.as_slice())
            .map_err(|e| AppError::Settings(format!("run_command: {e}")))?;
        Ok(CommandTable { build, run })
    }

    pub fn env_policy(&self) -> EnvPolicy {
        EnvPolicy::new(self.env_allow.iter().cloned(), self.env_prefixes.iter().cloned())
    }
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> AppResult<Settings> {
        let content = std::fs::read_to_string(path).map_err(|e| AppError::SettingsRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> AppResult<Settings> {
        // serde_yaml reads an empty document as unit, not as an empty map.
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| AppError::Settings(format!("Failed to parse settings YAML: {e}")))
    }

    /// Save settings to a YAML file.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| AppError::Settings(format!("Failed to serialize settings: {e}")))?;
        std::fs::write(path, content).map_err(|e| AppError::SettingsWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(AppError::Settings("root must not be empty".to_string()));
        }
        check_file_name("descriptor", &self.descriptor)?;
        check_file_name("config_file", &self.config_file)?;

        let limits = [
            ("limits.max_config_bytes", self.limits.max_config_bytes),
            ("limits.max_case_files", self.limits.max_case_files),
            ("limits.max_case_bytes", self.limits.max_case_bytes),
            ("runner.build_timeout_s", self.runner.build_timeout_s),
            ("runner.run_timeout_s", self.runner.run_timeout_s),
            ("runner.output_limit_bytes", self.runner.output_limit_bytes as u64),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(AppError::Settings(format!("{name} must be greater than zero")));
            }
        }

        self.runner.command_table()?;
        Ok(())
    }
}

/// A bare file name: no separators, not `.` or `..`.
fn check_file_name(field: &str, value: &str) -> AppResult<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control);
    if bad {
        return Err(AppError::Settings(format!(
            "{field} must be a plain file name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let settings = Settings::from_yaml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.runner.timeout(RunKind::Build), Duration::from_secs(300));
        assert_eq!(settings.runner.timeout(RunKind::Run), Duration::from_secs(600));
        settings.validate().unwrap();
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let yaml = "root: /srv/cases\nrunner:\n  run_timeout_s: 60\n";
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.root, PathBuf::from("/srv/cases"));
        assert_eq!(settings.runner.run_timeout_s, 60);
        assert_eq!(settings.runner.build_timeout_s, 300);
        assert_eq!(settings.limits, RepoLimits::default());
        assert_eq!(settings.descriptor, "Makefile");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_yaml("rot: /typo\n").unwrap_err();
        assert!(matches!(err, AppError::Settings(_)));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut settings = Settings::default();
        settings.runner.build_timeout_s = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.limits.max_case_files = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_case_files"));
    }

    #[test]
    fn empty_commands_are_rejected() {
        let mut settings = Settings::default();
        settings.runner.run_command.clear();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("run_command"));
    }

    #[test]
    fn file_names_must_be_plain() {
        for bad in ["", "..", "sub/Makefile", "Make\nfile"] {
            let settings = Settings {
                descriptor: bad.to_string(),
                ..Settings::default()
            };
            assert!(settings.validate().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casework.yaml");
        let mut settings = Settings::default();
        settings.runner.build_command = vec!["cmake".into(), "--build".into(), ".".into()];
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Settings::load(Path::new("/nonexistent/casework.yaml")).unwrap_err();
        assert!(matches!(err, AppError::SettingsRead { .. }));
    }
}
