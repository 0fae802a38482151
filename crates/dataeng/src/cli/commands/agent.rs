use std::io::{IsTerminal, Write};

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use crate::agent::console::{Console, EditorLineSource, LineSource, PROMPT};
use crate::agent::{AgentEndpoint, ChatState, CloudProvider, FileFormat, QuickSetup};
use crate::config::WorkspaceTarget;
use crate::session::Session;

#[derive(Debug, Clone, Args)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AgentCommand {
    /// Interactive chat; `/help` lists console commands.
    Chat,
    /// Send one message and print the reply.
    Ask(AskArgs),
    /// Ask the agent to set up a pipeline from three choices.
    Setup(SetupArgs),
}

#[derive(Debug, Clone, Args)]
pub struct AskArgs {
    #[arg(value_name = "MESSAGE")]
    pub message: String,
}

#[derive(Debug, Clone, Args)]
pub struct SetupArgs {
    #[arg(long, value_enum)]
    pub cloud: CloudProvider,

    /// Storage location, e.g. s3://my-bucket/data/
    #[arg(long, value_name = "URL")]
    pub url: String,

    #[arg(long, value_enum)]
    pub format: FileFormat,
}

impl SetupArgs {
    #[must_use]
    pub fn quick_setup(&self) -> QuickSetup {
        QuickSetup {
            cloud: self.cloud,
            url: self.url.clone(),
            format: self.format,
        }
    }
}

impl AgentCommand {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Chat => "agent chat",
            Self::Ask(_) => "agent ask",
            Self::Setup(_) => "agent setup",
        }
    }
}

pub fn run<S: Session + ?Sized>(
    args: &AgentArgs,
    session: &mut S,
    target: &WorkspaceTarget,
    out: &mut dyn Write,
) -> Result<()> {
    match &args.command {
        AgentCommand::Chat => {
            let mut input = EditorLineSource::new()?;
            run_with_input(args, session, target, &mut input, out)
        }
        AgentCommand::Ask(_) | AgentCommand::Setup(_) => {
            run_with_input(args, session, target, &mut NoInput, out)
        }
    }
}

/// Same as [`run`] with console input supplied by the caller.
pub fn run_with_input<S: Session + ?Sized>(
    args: &AgentArgs,
    session: &mut S,
    target: &WorkspaceTarget,
    input: &mut dyn LineSource,
    out: &mut dyn Write,
) -> Result<()> {
    let endpoint = AgentEndpoint::for_target(target).context("invalid agent target")?;
    let mut state = ChatState::new();
    let mut console = Console {
        session,
        target,
        endpoint: &endpoint,
        spinner: std::io::stderr().is_terminal(),
    };

    let answered = match &args.command {
        AgentCommand::Chat => {
            console.run(&mut state, input, out)?;
            true
        }
        AgentCommand::Ask(ask) => console.exchange(&mut state, &ask.message, out)?,
        AgentCommand::Setup(setup) => {
            let prompt = setup.quick_setup().prompt();
            writeln!(out, "{PROMPT}{prompt}")?;
            console.exchange(&mut state, &prompt, out)?
        }
    };
    out.flush()?;

    if !answered {
        bail!("{} did not get a reply from {}", args.command.name(), endpoint.agent_name());
    }
    Ok(())
}

struct NoInput;

impl LineSource for NoInput {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
