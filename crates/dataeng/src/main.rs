#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use clap::error::ErrorKind;
use dataeng::cli::app::{Cli, Command, RuntimeArgs};
use dataeng::cli::commands;
use dataeng::config::{RuntimeEnv, RuntimePaths, WorkspaceTarget};
use dataeng::session::{self, BootstrappedSession};
use dataeng::verify::ProcessRunner;
use tracing::{error, info};

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_PREVIEW_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };
    dataeng::logging::init_logging(cli.runtime.verbose);

    let command_name = command_name(&cli.command);
    info!(command = command_name, "starting");

    match execute(&cli) {
        Ok(()) => {
            info!(command = command_name, exit_code = EXIT_SUCCESS, "completed");
            EXIT_SUCCESS
        }
        Err(failure) => {
            let exit_code = classify_runtime_error(&failure);
            error!(command = command_name, exit_code, "failed");
            eprintln!("dataeng: {failure:#}");
            exit_code
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let env = RuntimeEnv::from_process();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Command::Preview(args) => {
            let mut connected = open_session(&cli.runtime, &env)?;
            commands::preview::run(args, &mut connected.session, &connected.target, &mut out)
        }
        Command::Agent(args) => {
            let mut connected = open_session(&cli.runtime, &env)?;
            commands::agent::run(args, &mut connected.session, &connected.target, &mut out)
        }
        Command::Verify(args) => {
            let target = WorkspaceTarget::default().layered(&cli.runtime.target_overrides());
            let connection = cli
                .runtime
                .connection
                .as_deref()
                .unwrap_or_else(|| env.connection_name());
            commands::verify::run(args, &target, connection, &mut ProcessRunner, &mut out)
        }
    }
}

fn open_session(args: &RuntimeArgs, env: &RuntimeEnv) -> Result<BootstrappedSession> {
    let runtime_paths = resolve_runtime_paths(args, env)?;
    let connected = session::bootstrap(
        env,
        &runtime_paths,
        args.connection.as_deref(),
        &args.target_overrides(),
        Duration::from_secs(args.timeout_secs),
    )?;
    Ok(connected)
}

fn classify_runtime_error(error: &anyhow::Error) -> i32 {
    if error
        .downcast_ref::<commands::preview::PreviewCommandFailure>()
        .is_some()
    {
        EXIT_PREVIEW_FAILURE
    } else {
        EXIT_RUNTIME_FAILURE
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Preview(args) => args.command.envelope_command(),
        Command::Agent(args) => args.command.name(),
        Command::Verify(_) => "verify",
    }
}

fn resolve_runtime_paths(args: &RuntimeArgs, env: &RuntimeEnv) -> Result<RuntimePaths> {
    let home_dir = match &args.home_dir {
        Some(path) => path.clone(),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set; pass --home-dir"))?,
    };

    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    dataeng::config::resolve_runtime_paths(
        &home_dir,
        &cwd,
        env.snowflake_home.as_deref(),
        args.connections_file.as_deref(),
    )
}
