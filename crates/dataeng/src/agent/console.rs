use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::{AgentEndpoint, ChatState, CloudProvider, FileFormat, QuickSetup, send_message};
use crate::config::WorkspaceTarget;
use crate::pipeline::{PipelineRecord, recent_pipelines};
use crate::session::Session;

pub const PROMPT: &str = "you> ";
const SPINNER_TICK: Duration = Duration::from_millis(80);

/// Where console input comes from; a terminal editor or a scripted feed.
pub trait LineSource {
    /// `Ok(None)` ends the console.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

pub struct EditorLineSource {
    editor: DefaultEditor,
}

impl EditorLineSource {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("failed to initialize line editor")?;
        Ok(Self { editor })
    }
}

impl LineSource for EditorLineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(error) => Err(error).context("failed to read console input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Message(String),
    Setup(QuickSetup),
    Reset,
    Pipelines,
    Help,
    Quit,
    Invalid(String),
}

const SETUP_USAGE: &str = "usage: /setup <aws-s3|azure|gcs> <storage-url> <csv|json|parquet|avro|orc>";

/// `None` for blank input.
#[must_use]
pub fn parse_console_input(line: &str) -> Option<ConsoleCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Some(ConsoleCommand::Message(trimmed.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let command = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();
    Some(match command.as_str() {
        "reset" | "clear" => ConsoleCommand::Reset,
        "pipelines" => ConsoleCommand::Pipelines,
        "help" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "setup" => parse_setup(&args),
        other => ConsoleCommand::Invalid(format!("unknown command `/{other}`; try /help")),
    })
}

fn parse_setup(args: &[&str]) -> ConsoleCommand {
    let [cloud, url, format] = args else {
        return ConsoleCommand::Invalid(SETUP_USAGE.to_string());
    };
    let cloud = match CloudProvider::from_str(cloud, true) {
        Ok(cloud) => cloud,
        Err(_) => return ConsoleCommand::Invalid(format!("unknown cloud provider `{cloud}`; {SETUP_USAGE}")),
    };
    let format = match FileFormat::from_str(format, true) {
        Ok(format) => format,
        Err(_) => return ConsoleCommand::Invalid(format!("unknown file format `{format}`; {SETUP_USAGE}")),
    };

    ConsoleCommand::Setup(QuickSetup {
        cloud,
        url: (*url).to_string(),
        format,
    })
}

#[must_use]
pub fn help_text(endpoint: &AgentEndpoint) -> String {
    [
        "This autonomous data engineer agent can:",
        "  - Generate storage integrations",
        "  - Create file formats",
        "  - Set up external stages",
        "  - Build external tables",
        "  - Execute and track pipelines",
        "Supported: AWS S3, Azure, GCS with CSV, JSON, Parquet, Avro, ORC",
        "Commands: /setup <cloud> <url> <format>, /pipelines, /reset, /help, /quit",
    ]
    .iter()
    .map(|line| (*line).to_string())
    .chain(std::iter::once(format!("Agent: {}", endpoint.agent_name())))
    .collect::<Vec<_>>()
    .join("\n")
}

/// The recent-pipelines tracker panel.
#[must_use]
pub fn render_recent_pipelines(records: &[PipelineRecord]) -> String {
    if records.is_empty() {
        return "No pipelines created yet".to_string();
    }

    records
        .iter()
        .map(|record| {
            format!(
                "{} {}\n    Type: {}\n    Status: {}\n    Table: {}\n    Created: {}",
                record.status_marker(),
                record.short_id(),
                record.data_source_type,
                record.status,
                record.table_name,
                record.created_at
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs `work` behind a terminal spinner when `enabled`.
pub fn with_spinner<T>(enabled: bool, message: &str, work: impl FnOnce() -> T) -> T {
    if !enabled {
        return work();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(SPINNER_TICK);
    let output = work();
    spinner.finish_and_clear();
    output
}

pub struct Console<'a, S: Session + ?Sized> {
    pub session: &'a mut S,
    pub target: &'a WorkspaceTarget,
    pub endpoint: &'a AgentEndpoint,
    pub spinner: bool,
}

impl<S: Session + ?Sized> Console<'_, S> {
    /// Sends one message and writes the assistant turn (or the failure) to `out`.
    /// Returns whether the agent answered.
    pub fn exchange(
        &mut self,
        state: &mut ChatState,
        message: &str,
        out: &mut dyn Write,
    ) -> Result<bool> {
        let session = &mut *self.session;
        let endpoint = self.endpoint;
        let outcome = with_spinner(self.spinner, "Agent is working...", || {
            send_message(session, endpoint, state, message)
        });

        match outcome {
            Ok(reply) => {
                writeln!(out, "agent> {}", reply.transcript_text())?;
                Ok(true)
            }
            Err(error) => {
                writeln!(out, "Agent call failed: {error}")?;
                Ok(false)
            }
        }
    }

    fn show_pipelines(&mut self, out: &mut dyn Write) -> Result<()> {
        let session = &mut *self.session;
        let target = self.target;
        let outcome = with_spinner(self.spinner, "Loading pipelines...", || {
            recent_pipelines(session, target)
        });

        match outcome {
            Ok(records) => writeln!(out, "{}", render_recent_pipelines(&records))?,
            Err(error) => writeln!(out, "Could not load pipelines: {error}")?,
        }
        Ok(())
    }

    /// Interactive loop; returns when input ends or on `/quit`.
    pub fn run(
        &mut self,
        state: &mut ChatState,
        input: &mut dyn LineSource,
        out: &mut dyn Write,
    ) -> Result<()> {
        writeln!(
            out,
            "Describe your data source (e.g. 'I have CSV files in s3://my-bucket/data/'). /help lists commands."
        )?;

        while let Some(line) = input.read_line(PROMPT)? {
            let Some(command) = parse_console_input(&line) else {
                continue;
            };

            match command {
                ConsoleCommand::Quit => break,
                ConsoleCommand::Help => writeln!(out, "{}", help_text(self.endpoint))?,
                ConsoleCommand::Reset => {
                    state.reset();
                    writeln!(out, "Chat cleared.")?;
                }
                ConsoleCommand::Pipelines => self.show_pipelines(out)?,
                ConsoleCommand::Setup(setup) => {
                    let prompt = setup.prompt();
                    writeln!(out, "{PROMPT}{prompt}")?;
                    self.exchange(state, &prompt, out)?;
                }
                ConsoleCommand::Message(message) => {
                    self.exchange(state, &message, out)?;
                }
                ConsoleCommand::Invalid(reason) => writeln!(out, "{reason}")?,
            }
            out.flush()?;
        }

        Ok(())
    }
}
