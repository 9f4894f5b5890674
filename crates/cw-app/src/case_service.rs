//! Case operations for frontends.
//!
//! Case ids arrive as untrusted strings. Each operation parses the id,
//! resolves it to a case on disk, then hands the case to the component that
//! does the work.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cw_core::{Case, CaseId, PathGuard, Sanitized};
use cw_repo::{CaseReplicator, CaseScanner, ConfigDocument, ConfigStore};
use cw_runner::{ProcessRunner, RunKind, RunProgressEvent, RunRequest, RunResult, SingleSlotGate};
use tracing::info;

use crate::error::AppResult;
use crate::settings::Settings;

pub struct CaseService {
    settings: Settings,
    scanner: CaseScanner,
    configs: ConfigStore,
    replicator: CaseReplicator,
    runner: ProcessRunner,
}

impl CaseService {
    /// Service with its own admission gate.
    pub fn new(settings: Settings) -> AppResult<Self> {
        Self::with_gate(settings, Arc::new(SingleSlotGate::new()))
    }

    /// Service sharing `gate` with other services, so heavy runs stay
    /// serialized across all of them.
    pub fn with_gate(settings: Settings, gate: Arc<SingleSlotGate>) -> AppResult<Self> {
        settings.validate()?;
        let guard = PathGuard::new(&settings.root)?;

        let scanner = CaseScanner::new(guard.clone()).with_descriptor(settings.descriptor.clone());
        let configs = ConfigStore::new(guard.clone(), &settings.limits)
            .with_file_name(settings.config_file.clone());
        let replicator = CaseReplicator::new(guard.clone(), &settings.limits);
        let runner = ProcessRunner::with_gate(guard, gate)
            .with_commands(settings.runner.command_table()?)
            .with_env_policy(settings.runner.env_policy())
            .with_output_limit(settings.runner.output_limit_bytes);

        info!(root = %Sanitized(&scanner.guard().root().to_string_lossy()), "case service ready");
        Ok(Self {
            settings,
            scanner,
            configs,
            replicator,
            runner,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Canonical cases root.
    pub fn root(&self) -> &Path {
        self.scanner.guard().root()
    }

    pub fn gate(&self) -> &Arc<SingleSlotGate> {
        self.runner.gate()
    }

    /// Every case, ordered by domain then name. Empty when the root holds
    /// no cases or has disappeared.
    pub fn list_cases(&self) -> Vec<Case> {
        self.scanner.list_cases()
    }

    pub fn find_case(&self, case_id: &str) -> AppResult<Case> {
        let id = CaseId::parse(case_id)?;
        Ok(self.scanner.find(&id)?)
    }

    pub fn read_config(&self, case_id: &str) -> AppResult<ConfigDocument> {
        let case = self.find_case(case_id)?;
        info!(case = %Sanitized(case.id.as_str()), "reading config");
        Ok(self.configs.read(&case)?)
    }

    pub fn write_config(&self, case_id: &str, content: &str) -> AppResult<()> {
        let case = self.find_case(case_id)?;
        info!(case = %Sanitized(case.id.as_str()), bytes = content.len(), "saving config");
        Ok(self.configs.write(&case, content)?)
    }

    pub fn build(&self, case_id: &str) -> AppResult<RunResult> {
        self.run_case(case_id, RunKind::Build, None, None)
    }

    pub fn run(&self, case_id: &str) -> AppResult<RunResult> {
        self.run_case(case_id, RunKind::Run, None, None)
    }

    /// Build or run a case. `timeout` falls back to the configured value for
    /// `kind`. A timed-out or unstartable run is still `Ok`; check
    /// [`RunResult::cause`] or use [`RunResult::into_checked`].
    pub fn run_case(
        &self,
        case_id: &str,
        kind: RunKind,
        timeout: Option<Duration>,
        progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
    ) -> AppResult<RunResult> {
        let case = self.find_case(case_id)?;
        let timeout = timeout.unwrap_or_else(|| self.settings.runner.timeout(kind));
        let request = RunRequest::new(&case, kind).with_timeout(timeout);
        Ok(self.runner.run_with_progress(&request, progress_cb)?)
    }

    /// Copy a case next to itself under `new_name`.
    pub fn duplicate(&self, case_id: &str, new_name: &str) -> AppResult<Case> {
        let source = self.find_case(case_id)?;
        info!(
            case = %Sanitized(source.id.as_str()),
            new_name = %Sanitized(new_name),
            "duplicating case"
        );
        Ok(self.replicator.duplicate(&source, new_name)?)
    }

    pub fn delete(&self, case_id: &str) -> AppResult<()> {
        let case = self.find_case(case_id)?;
        info!(case = %Sanitized(case.id.as_str()), "deleting case");
        Ok(self.replicator.remove(&case)?)
    }
}
