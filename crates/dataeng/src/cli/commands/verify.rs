use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::config::WorkspaceTarget;
use crate::verify::{CommandRunner, DEFAULT_CLIENT, VerifyPlan, run_verification};

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Snowflake CLI executable used for the checks.
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_CLIENT)]
    pub client: String,
}

/// Individual check failures are printed, never returned.
pub fn run<R: CommandRunner + ?Sized>(
    args: &VerifyArgs,
    target: &WorkspaceTarget,
    connection: &str,
    runner: &mut R,
    out: &mut dyn Write,
) -> Result<()> {
    let plan = VerifyPlan::new(target, connection)
        .context("invalid verification target")?
        .with_client(&args.client);
    let report = run_verification(&plan, runner, out)?;
    out.flush()?;

    info!(
        passed = report.passed_count(),
        total = report.checks.len(),
        "verification finished"
    );
    Ok(())
}
