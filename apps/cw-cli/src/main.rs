use clap::{Parser, Subcommand};
use cw_app::{
    AppError, AppResult, CaseService, ErrorKind, RunCause, RunKind, RunPhase, RunProgressEvent,
    RunResult, Settings,
};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "casework")]
#[command(about = "Casework CLI - browse, configure, build and run simulation cases", long_about = None)]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true, env = "CW_SETTINGS")]
    settings: Option<PathBuf>,
    /// Cases root directory, overrides the settings file
    #[arg(long, global = true, env = "CW_ROOT")]
    root: Option<PathBuf>,
    /// Print results and errors as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all cases
    Cases,
    /// Show or replace a case's configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Build a case
    Build(RunArgs),
    /// Run a case
    Run(RunArgs),
    /// Copy a case under a new name, leaving out generated files
    Duplicate {
        /// Case id (Domain/Name)
        case: String,
        /// Name of the copy
        new_name: String,
    },
    /// Delete a case directory
    Delete {
        /// Case id (Domain/Name)
        case: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the configuration file
    Show {
        /// Case id (Domain/Name)
        case: String,
    },
    /// Replace the configuration file
    Save {
        /// Case id (Domain/Name)
        case: String,
        /// New content, or `-` for stdin
        source: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Case id (Domain/Name)
    case: String,
    /// Timeout in seconds (defaults to the configured value)
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    kind: ErrorKind,
    message: &'a str,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err, json);
            exit_code_for(err.kind())
        }
    }
}

fn report_error(err: &AppError, json: bool) {
    let message = err.to_string();
    if json {
        let report = ErrorReport {
            kind: err.kind(),
            message: &message,
        };
        match serde_json::to_string(&report) {
            Ok(text) => eprintln!("{text}"),
            Err(_) => eprintln!("error ({}): {message}", err.kind().as_str()),
        }
    } else {
        eprintln!("error ({}): {message}", err.kind().as_str());
    }
}

fn run(cli: Cli) -> AppResult<ExitCode> {
    let settings = load_settings(cli.settings.as_deref(), cli.root)?;
    let service = CaseService::new(settings)?;
    let json = cli.json;

    match cli.command {
        Commands::Cases => cmd_cases(&service, json),
        Commands::Config(ConfigCommands::Show { case }) => cmd_config_show(&service, &case),
        Commands::Config(ConfigCommands::Save { case, source }) => {
            cmd_config_save(&service, &case, &source)
        }
        Commands::Build(args) => cmd_run(&service, RunKind::Build, &args, json),
        Commands::Run(args) => cmd_run(&service, RunKind::Run, &args, json),
        Commands::Duplicate { case, new_name } => cmd_duplicate(&service, &case, &new_name),
        Commands::Delete { case } => cmd_delete(&service, &case),
    }
}

fn load_settings(path: Option<&Path>, root: Option<PathBuf>) -> AppResult<Settings> {
    let mut settings = match path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(root) = root {
        settings.root = root;
    }
    debug!(root = %settings.root.display(), "settings loaded");
    Ok(settings)
}

fn cmd_cases(service: &CaseService, json: bool) -> AppResult<ExitCode> {
    let cases = service.list_cases();

    if json {
        print_json(&cases)?;
    } else if cases.is_empty() {
        println!("No cases found under {}", service.root().display());
    } else {
        let mut domain = "";
        for case in &cases {
            if case.domain != domain {
                println!("{}", case.domain);
                domain = case.domain.as_str();
            }
            println!("  {:<32} {}", case.name, case.id);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(service: &CaseService, case: &str) -> AppResult<ExitCode> {
    let doc = service.read_config(case)?;
    print!("{}", doc.content);
    io::stdout().flush()?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_save(service: &CaseService, case: &str, source: &Path) -> AppResult<ExitCode> {
    // One byte over the limit is enough for the store to refuse it.
    let cap = service.settings().limits.max_config_bytes.saturating_add(1);
    let mut content = String::new();
    if source == Path::new("-") {
        io::stdin().take(cap).read_to_string(&mut content)?;
    } else {
        std::fs::File::open(source)?
            .take(cap)
            .read_to_string(&mut content)?;
    }

    service.write_config(case, &content)?;
    println!("✓ Saved configuration for {case}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(service: &CaseService, kind: RunKind, args: &RunArgs, json: bool) -> AppResult<ExitCode> {
    let timeout = args.timeout.map(Duration::from_secs);
    let result = service.run_case(
        &args.case,
        kind,
        timeout,
        Some(&mut |event: RunProgressEvent| render_progress(&event)),
    )?;

    if json {
        print_json(&result)?;
    } else {
        print_run_result(&result);
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        match result.cause {
            RunCause::Completed => ExitCode::FAILURE,
            RunCause::TimedOut => exit_code_for(ErrorKind::TimedOut),
            RunCause::FailedToStart => exit_code_for(ErrorKind::FailedToStart),
        }
    })
}

fn cmd_duplicate(service: &CaseService, case: &str, new_name: &str) -> AppResult<ExitCode> {
    let copy = service.duplicate(case, new_name)?;
    println!("✓ Created {} at {}", copy.id, copy.path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_delete(service: &CaseService, case: &str) -> AppResult<ExitCode> {
    service.delete(case)?;
    println!("✓ Deleted {case}");
    Ok(ExitCode::SUCCESS)
}

fn render_progress(event: &RunProgressEvent) {
    let label = match event.phase {
        RunPhase::Idle => return,
        RunPhase::Spawning => "starting",
        RunPhase::Executing => "executing",
        RunPhase::Completed => "completed",
        RunPhase::TimedOut => "timed out",
        RunPhase::FailedToStart => "failed to start",
    };
    match &event.message {
        Some(message) => eprintln!(
            "[{} {:>7.2}s] {label}: {message}",
            event.kind, event.elapsed_wall_s
        ),
        None => eprintln!("[{} {:>7.2}s] {label}", event.kind, event.elapsed_wall_s),
    }
}

fn print_run_result(result: &RunResult) {
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    let _ = io::stdout().flush();

    match result.cause {
        RunCause::Completed if result.success => {
            eprintln!("✓ {} finished in {:.1}s", result.kind, result.duration_s)
        }
        RunCause::Completed => eprintln!(
            "✗ {} failed with exit code {}",
            result.kind,
            result
                .exit_code
                .map_or_else(|| "none".to_string(), |c| c.to_string())
        ),
        RunCause::TimedOut | RunCause::FailedToStart => eprintln!(
            "✗ {}",
            result.error.as_deref().unwrap_or("run did not complete")
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| AppError::Io(e.into()))?;
    println!("{text}");
    Ok(())
}

/// Distinct exit codes per failure kind, for scripts.
fn exit_code_for(kind: ErrorKind) -> ExitCode {
    let code: u8 = match kind {
        ErrorKind::Validation => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::PathSecurity => 4,
        ErrorKind::TooLarge => 5,
        ErrorKind::Busy => 6,
        ErrorKind::TimedOut => 7,
        ErrorKind::FailedToStart => 8,
        ErrorKind::Io => 9,
    };
    ExitCode::from(code)
}
