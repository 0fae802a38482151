use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{agent::AgentArgs, preview::PreviewArgs, verify::VerifyArgs};
use crate::config::TargetOverrides;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[command(
    name = "dataeng",
    version,
    about = "Data engineer agent console and pipeline preview for Snowflake"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    /// Connection profile name; falls back to SNOWFLAKE_CONNECTION_NAME, then `pm`.
    #[arg(long, global = true, value_name = "NAME")]
    pub connection: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    pub connections_file: Option<PathBuf>,

    #[arg(long, global = true, value_name = "NAME")]
    pub database: Option<String>,

    #[arg(long, global = true, value_name = "NAME")]
    pub schema: Option<String>,

    #[arg(long, global = true, value_name = "NAME")]
    pub warehouse: Option<String>,

    #[arg(long, global = true, value_name = "NAME")]
    pub agent: Option<String>,

    /// Statement timeout for remote calls.
    #[arg(long, global = true, value_name = "SECONDS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,
}

impl RuntimeArgs {
    #[must_use]
    pub fn target_overrides(&self) -> TargetOverrides {
        TargetOverrides {
            database: self.database.clone(),
            schema: self.schema.clone(),
            warehouse: self.warehouse.clone(),
            agent: self.agent.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Browse tracked pipelines and preview their data.
    Preview(PreviewArgs),
    /// Talk to the data engineer agent.
    Agent(AgentArgs),
    /// Check that the agent and its procedures are deployed.
    Verify(VerifyArgs),
}
