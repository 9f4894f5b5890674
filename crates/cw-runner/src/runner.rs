//! Build and run execution.
//!
//! A run moves through `Idle -> Spawning -> Executing -> {Completed |
//! TimedOut | FailedToStart} -> Idle`. Admission is checked before anything
//! else; a run that cannot get the gate is refused without touching the
//! filesystem. The wait on the child is a single blocking call bounded by the
//! timeout, after which the child's whole process group is killed.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cw_core::{Case, GuardError, PathGuard, Sanitized, escape_control};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use wait_timeout::ChildExt;

use crate::capture::{DEFAULT_OUTPUT_LIMIT, PipeCapture};
use crate::env::EnvPolicy;
use crate::gate::{AdmissionGate, SingleSlotGate};
use crate::{RunnerError, RunnerResult};

pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// How long to keep collecting output after the child is gone.
const READER_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Build,
    Run,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Build => "build",
            RunKind::Run => "run",
        }
    }

    pub fn default_timeout(self) -> Duration {
        match self {
            RunKind::Build => DEFAULT_BUILD_TIMEOUT,
            RunKind::Run => DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunCause {
    Completed,
    TimedOut,
    FailedToStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Spawning,
    Executing,
    Completed,
    TimedOut,
    FailedToStart,
}

impl From<RunCause> for RunPhase {
    fn from(cause: RunCause) -> Self {
        match cause {
            RunCause::Completed => RunPhase::Completed,
            RunCause::TimedOut => RunPhase::TimedOut,
            RunCause::FailedToStart => RunPhase::FailedToStart,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub kind: RunKind,
    pub phase: RunPhase,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
}

/// Program plus arguments. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv-style list; the first element is the program.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> RunnerResult<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(RunnerError::InvalidCommand("command is empty".to_string()));
        };
        let program = program.as_ref();
        if program.trim().is_empty() {
            return Err(RunnerError::InvalidCommand(
                "program name is empty".to_string(),
            ));
        }
        Ok(Self::new(program, args.iter().map(|a| a.as_ref())))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    pub build: CommandSpec,
    pub run: CommandSpec,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            build: CommandSpec::new("make", Vec::<String>::new()),
            run: CommandSpec::new("make", ["run"]),
        }
    }
}

impl CommandTable {
    pub fn get(&self, kind: RunKind) -> &CommandSpec {
        match kind {
            RunKind::Build => &self.build,
            RunKind::Run => &self.run,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub case: &'a Case,
    pub kind: RunKind,
    pub timeout: Duration,
}

impl<'a> RunRequest<'a> {
    /// Request with the kind's default timeout.
    pub fn new(case: &'a Case, kind: RunKind) -> Self {
        Self {
            case,
            kind,
            timeout: kind.default_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of one admitted run. Produced for every run that got past
/// admission and path checks, including timeouts and spawn failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub case_id: String,
    pub kind: RunKind,
    pub cause: RunCause,
    pub success: bool,
    /// `None` when the child was killed by a signal or never started.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub error: Option<String>,
    pub duration_s: f64,
    pub timeout_s: f64,
    pub started_at: String,
}

impl RunResult {
    /// Turn timed-out and failed-to-start results into errors. The result
    /// travels inside the error so partial output is not lost.
    pub fn into_checked(self) -> RunnerResult<RunResult> {
        match self.cause {
            RunCause::Completed => Ok(self),
            RunCause::TimedOut => Err(RunnerError::TimedOut {
                partial: Box::new(self),
            }),
            RunCause::FailedToStart => Err(RunnerError::FailedToStart {
                reason: self.error.clone().unwrap_or_default(),
                partial: Box::new(self),
            }),
        }
    }
}

fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    kind: RunKind,
    phase: RunPhase,
    started: Instant,
    message: Option<String>,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(RunProgressEvent {
            kind,
            phase,
            elapsed_wall_s: started.elapsed().as_secs_f64(),
            message,
        });
    }
}

#[derive(Debug)]
pub struct ProcessRunner<G: AdmissionGate = SingleSlotGate> {
    guard: PathGuard,
    gate: Arc<G>,
    commands: CommandTable,
    env: EnvPolicy,
    output_limit: usize,
}

impl ProcessRunner<SingleSlotGate> {
    /// Runner with its own single-slot gate.
    pub fn new(guard: PathGuard) -> Self {
        Self::with_gate(guard, Arc::new(SingleSlotGate::new()))
    }
}

impl<G: AdmissionGate> ProcessRunner<G> {
    pub fn with_gate(guard: PathGuard, gate: Arc<G>) -> Self {
        Self {
            guard,
            gate,
            commands: CommandTable::default(),
            env: EnvPolicy::default(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn with_commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_env_policy(mut self, env: EnvPolicy) -> Self {
        self.env = env;
        self
    }

    /// Bytes kept per stream.
    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    pub fn gate(&self) -> &Arc<G> {
        &self.gate
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn run(&self, request: &RunRequest<'_>) -> RunnerResult<RunResult> {
        self.run_with_progress(request, None)
    }

    /// Run and report phase changes to `progress_cb`.
    ///
    /// Returns [`RunnerError::Busy`] at once if another run holds the gate.
    /// Timeouts and spawn failures come back as `Ok` with the matching
    /// [`RunCause`]; see [`RunResult::into_checked`].
    pub fn run_with_progress(
        &self,
        request: &RunRequest<'_>,
        mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
    ) -> RunnerResult<RunResult> {
        let case_id = request.case.id.as_str();

        let Some(permit) = self.gate.try_admit() else {
            warn!(
                case = %Sanitized(case_id),
                kind = %request.kind,
                "rejected run, another build or run is in progress"
            );
            return Err(RunnerError::Busy);
        };

        let started = Instant::now();
        let dir = self
            .guard
            .resolve_case_dir(&request.case.path)
            .map_err(|err| match err {
                GuardError::NotFound { .. } => RunnerError::CaseNotFound {
                    case_id: case_id.to_string(),
                },
                other => other.into(),
            })?;

        let result = self.execute(request, &dir, started, &mut progress_cb);
        drop(permit);
        emit_progress(&mut progress_cb, request.kind, RunPhase::Idle, started, None);
        result
    }

    fn execute(
        &self,
        request: &RunRequest<'_>,
        dir: &Path,
        started: Instant,
        progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    ) -> RunnerResult<RunResult> {
        let kind = request.kind;
        let spec = self.commands.get(kind);
        let shown = spec.to_string();
        let case_id = request.case.id.as_str();

        let mut result = RunResult {
            case_id: case_id.to_string(),
            kind,
            cause: RunCause::Completed,
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            error: None,
            duration_s: 0.0,
            timeout_s: request.timeout.as_secs_f64(),
            started_at: chrono::Utc::now().to_rfc3339(),
        };

        emit_progress(progress_cb, kind, RunPhase::Spawning, started, Some(shown.clone()));
        info!(
            case = %Sanitized(case_id),
            kind = %kind,
            command = %Sanitized(&shown),
            timeout_s = result.timeout_s,
            "starting"
        );

        let mut child = match self.spawn(spec, dir) {
            Ok(child) => child,
            Err(err) => {
                error!(case = %Sanitized(case_id), kind = %kind, error = %err, "failed to start");
                result.cause = RunCause::FailedToStart;
                result.error = Some(format!(
                    "failed to start `{}`: {err}",
                    escape_control(&shown)
                ));
                result.duration_s = started.elapsed().as_secs_f64();
                emit_progress(
                    progress_cb,
                    kind,
                    RunPhase::FailedToStart,
                    started,
                    result.error.clone(),
                );
                return Ok(result);
            }
        };
        emit_progress(progress_cb, kind, RunPhase::Executing, started, None);

        let stdout = match child.stdout.take() {
            Some(pipe) => PipeCapture::spawn("stdout", pipe, self.output_limit),
            None => PipeCapture::empty(),
        };
        let stderr = match child.stderr.take() {
            Some(pipe) => PipeCapture::spawn("stderr", pipe, self.output_limit),
            None => PipeCapture::empty(),
        };

        let status = match child.wait_timeout(request.timeout) {
            Ok(status) => status,
            Err(err) => {
                kill_process_tree(&mut child);
                reap(&mut child);
                return Err(RunnerError::Io {
                    context: "waiting for child process".to_string(),
                    source: err,
                });
            }
        };
        if status.is_none() {
            kill_process_tree(&mut child);
            reap(&mut child);
        }

        let out = stdout.finish(READER_GRACE);
        let err = stderr.finish(READER_GRACE);
        result.stdout = out.text;
        result.stdout_truncated = out.truncated;
        result.stderr = err.text;
        result.stderr_truncated = err.truncated;
        result.duration_s = started.elapsed().as_secs_f64();

        match status {
            Some(status) => {
                result.exit_code = status.code();
                result.success = status.success();
                info!(
                    case = %Sanitized(case_id),
                    kind = %kind,
                    exit_code = ?result.exit_code,
                    success = result.success,
                    duration_s = result.duration_s,
                    "finished"
                );
            }
            None => {
                result.cause = RunCause::TimedOut;
                result.error = Some(format!(
                    "{kind} timed out (limit: {} s)",
                    request.timeout.as_secs_f64()
                ));
                error!(
                    case = %Sanitized(case_id),
                    kind = %kind,
                    timeout_s = result.timeout_s,
                    "timed out, process group killed"
                );
            }
        }
        if out.truncated || err.truncated {
            debug!(case = %Sanitized(case_id), "output truncated at {} bytes", self.output_limit);
        }

        emit_progress(
            progress_cb,
            kind,
            result.cause.into(),
            started,
            result.error.clone(),
        );
        Ok(result)
    }

    fn spawn(&self, spec: &CommandSpec, dir: &Path) -> io::Result<Child> {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.args())
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.env.apply(&mut cmd);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so a timeout also reaches whatever the command spawned.
            cmd.process_group(0);
        }

        cmd.spawn()
    }
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let group = i32::try_from(child.id()).map(Pid::from_raw);
    match group {
        Ok(pgid) => {
            if let Err(err) = killpg(pgid, Signal::SIGKILL) {
                debug!(error = %err, "process group kill failed, killing child only");
                kill_child(child);
            }
        }
        Err(_) => kill_child(child),
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    kill_child(child);
}

fn kill_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "kill failed");
    }
}

fn reap(child: &mut Child) {
    if let Err(err) = child.wait() {
        warn!(error = %err, "failed to reap child process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cause: RunCause) -> RunResult {
        RunResult {
            case_id: "Fluid/cavity2d".to_string(),
            kind: RunKind::Build,
            cause,
            success: false,
            exit_code: None,
            stdout: "partial".to_string(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            error: Some("boom".to_string()),
            duration_s: 1.0,
            timeout_s: 1.0,
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn completed_results_pass_the_check() {
        let result = sample(RunCause::Completed);
        assert_eq!(result.clone().into_checked().unwrap(), result);
    }

    #[test]
    fn timeouts_become_errors_with_partial_output() {
        let err = sample(RunCause::TimedOut).into_checked().unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut { .. }));
        assert_eq!(err.partial().unwrap().stdout, "partial");
        assert_eq!(
            err.to_string(),
            "build timed out after 1 s for case Fluid/cavity2d"
        );
    }

    #[test]
    fn spawn_failures_carry_the_reason() {
        let err = sample(RunCause::FailedToStart).into_checked().unwrap_err();
        match &err {
            RunnerError::FailedToStart { reason, .. } => assert_eq!(reason, "boom"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.partial().is_some());
    }

    #[test]
    fn command_from_argv() {
        let spec = CommandSpec::from_argv(&["make", "run", "-j4"]).unwrap();
        assert_eq!(spec.program(), "make");
        assert_eq!(spec.args(), ["run", "-j4"]);
        assert_eq!(spec.to_string(), "make run -j4");

        let empty: [&str; 0] = [];
        assert!(matches!(
            CommandSpec::from_argv(&empty),
            Err(RunnerError::InvalidCommand(_))
        ));
        assert!(CommandSpec::from_argv(&["  "]).is_err());
    }

    #[test]
    fn default_commands_and_timeouts() {
        let table = CommandTable::default();
        assert_eq!(table.get(RunKind::Build).to_string(), "make");
        assert_eq!(table.get(RunKind::Run).to_string(), "make run");
        assert_eq!(RunKind::Build.default_timeout(), Duration::from_secs(300));
        assert_eq!(RunKind::Run.default_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn causes_serialize_in_kebab_case() {
        let json = serde_json::to_value(sample(RunCause::TimedOut)).unwrap();
        assert_eq!(json["cause"], "timed-out");
        assert_eq!(json["kind"], "build");
        assert_eq!(
            serde_json::to_value(RunCause::FailedToStart).unwrap(),
            "failed-to-start"
        );
    }
}
