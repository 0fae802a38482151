//! Chat exchange with the remotely hosted data engineer agent.
//!
//! The agent is a platform-managed service reached through two SQL functions.
//! This module only frames requests, tracks the conversation, and interprets
//! the reply shape; it never reasons about the content.

pub mod console;

use std::fmt::{Display, Formatter};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::WorkspaceTarget;
use crate::pipeline::{IdentifierError, QualifiedName};
use crate::session::{Session, SessionError, Statement};
use crate::utils::value_text;

pub const THREAD_ORIGIN: &str = "data_engineer_app";
pub const UNEXPECTED_REPLY_PREFIX: &str = "Unexpected response format: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsolePhase {
    #[default]
    New,
    ThreadEstablished,
    AwaitingInput,
    AgentResponding,
}

/// Per-console conversation state, threaded through every handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    messages: Vec<ChatMessage>,
    thread_id: Option<String>,
    phase: ConsolePhase,
    transitions: Vec<ConsolePhase>,
}

impl ChatState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the transcript and forgets the thread.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    #[must_use]
    pub fn phase(&self) -> ConsolePhase {
        self.phase
    }

    /// Phases entered during the most recent exchange, in order.
    #[must_use]
    pub fn transitions(&self) -> &[ConsolePhase] {
        &self.transitions
    }

    fn enter(&mut self, phase: ConsolePhase) {
        debug!(from = ?self.phase, to = ?phase, "console phase changed");
        self.phase = phase;
        self.transitions.push(phase);
    }

    fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    /// Phase once a request handler returns, whether or not the call succeeded.
    fn settle(&mut self) {
        let phase = if self.thread_id.is_some() {
            ConsolePhase::AwaitingInput
        } else {
            ConsolePhase::New
        };
        self.enter(phase);
    }
}

/// Fully qualified agent plus the origin label used for new threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    agent_name: String,
    thread_origin: String,
}

impl AgentEndpoint {
    pub fn for_target(target: &WorkspaceTarget) -> Result<Self, IdentifierError> {
        let name = QualifiedName::new(&target.database, &target.schema, "agent", &target.agent)?;
        Ok(Self {
            agent_name: name.to_string(),
            thread_origin: THREAD_ORIGIN.to_string(),
        })
    }

    #[must_use]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    #[must_use]
    pub fn create_thread_statement(&self) -> Statement {
        Statement::new("SELECT SYSTEM$CREATE_CORTEX_THREAD(?)").bind_text(&self.thread_origin)
    }

    #[must_use]
    pub fn run_agent_statement(&self, thread_id: &str, message: &str) -> Statement {
        Statement::new("SELECT SYSTEM$RUN_CORTEX_AGENT(?, ?, PARSE_JSON(?))")
            .bind_text(&self.agent_name)
            .bind_text(thread_id)
            .bind_text(message_envelope(message).to_string())
    }
}

#[must_use]
pub fn message_envelope(message: &str) -> Value {
    json!({ "messages": [{ "role": "user", "content": message }] })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Text(String),
    Malformed { raw: String },
}

impl AgentReply {
    #[must_use]
    pub fn transcript_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Malformed { raw } => format!("{UNEXPECTED_REPLY_PREFIX}{raw}"),
        }
    }

    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Interprets the agent's reply cell.
///
/// The cell holds JSON text (or, from some drivers, an already decoded value).
/// `content` is either a string or a list of blocks whose first `text` wins;
/// a first block without `text` falls back to the JSON of the whole list.
#[must_use]
pub fn parse_agent_reply(cell: &Value) -> AgentReply {
    let decoded = match cell {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(_) => return AgentReply::Malformed { raw: raw.clone() },
        },
        other => other.clone(),
    };

    match decoded.get("content") {
        Some(Value::String(text)) => AgentReply::Text(text.clone()),
        Some(Value::Array(blocks)) => match blocks.first() {
            Some(first) => match first.get("text") {
                Some(text) => AgentReply::Text(value_text(text)),
                None => AgentReply::Text(Value::Array(blocks.clone()).to_string()),
            },
            None => AgentReply::Malformed {
                raw: decoded.to_string(),
            },
        },
        _ => AgentReply::Malformed {
            raw: decoded.to_string(),
        },
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to create conversation thread: {0}")]
    Thread(#[source] SessionError),

    #[error("thread creation returned no identifier")]
    EmptyThread,

    #[error("agent invocation failed: {0}")]
    Invoke(#[source] SessionError),

    #[error("agent returned no rows")]
    EmptyReply,
}

/// One exchange: record the user turn, make sure a thread exists, invoke the
/// agent and record its reply (or a diagnostic for an unexpected shape).
///
/// On error the user turn stays in the transcript without a reply; a thread
/// created before the failure is kept for the next attempt.
pub fn send_message<S: Session + ?Sized>(
    session: &mut S,
    endpoint: &AgentEndpoint,
    state: &mut ChatState,
    message: &str,
) -> Result<AgentReply, AgentError> {
    state.transitions.clear();
    state.push(ChatRole::User, message);

    let outcome = exchange(session, endpoint, state, message);
    if let Ok(reply) = &outcome {
        state.push(ChatRole::Assistant, reply.transcript_text());
    }
    state.settle();
    outcome
}

fn exchange<S: Session + ?Sized>(
    session: &mut S,
    endpoint: &AgentEndpoint,
    state: &mut ChatState,
    message: &str,
) -> Result<AgentReply, AgentError> {
    let thread_id = match state.thread_id.clone() {
        Some(thread_id) => thread_id,
        None => {
            let thread_id = create_thread(session, endpoint)?;
            info!(thread_id = %thread_id, "conversation thread created");
            state.thread_id = Some(thread_id.clone());
            state.enter(ConsolePhase::ThreadEstablished);
            thread_id
        }
    };
    state.enter(ConsolePhase::AgentResponding);

    let result = session
        .execute(&endpoint.run_agent_statement(&thread_id, message))
        .map_err(AgentError::Invoke)?;
    let cell = result.first_value().ok_or(AgentError::EmptyReply)?;
    let reply = parse_agent_reply(cell);
    if reply.is_malformed() {
        debug!(thread_id = %thread_id, "agent reply had an unexpected shape");
    }
    Ok(reply)
}

fn create_thread<S: Session + ?Sized>(
    session: &mut S,
    endpoint: &AgentEndpoint,
) -> Result<String, AgentError> {
    let result = session
        .execute(&endpoint.create_thread_statement())
        .map_err(AgentError::Thread)?;
    result
        .first_value()
        .map(value_text)
        .map(|thread_id| thread_id.trim().to_string())
        .filter(|thread_id| !thread_id.is_empty())
        .ok_or(AgentError::EmptyThread)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CloudProvider {
    #[value(name = "aws-s3", alias = "s3", alias = "aws")]
    AwsS3,
    Azure,
    Gcs,
}

impl Display for CloudProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AwsS3 => "AWS S3",
            Self::Azure => "Azure",
            Self::Gcs => "GCS",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileFormat {
    Csv,
    Json,
    Parquet,
    Avro,
    Orc,
}

impl Display for FileFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Csv => "CSV",
            Self::Json => "JSON",
            Self::Parquet => "Parquet",
            Self::Avro => "Avro",
            Self::Orc => "ORC",
        })
    }
}

/// The quick-setup form, rendered into a single instruction for the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickSetup {
    pub cloud: CloudProvider,
    pub url: String,
    pub format: FileFormat,
}

impl QuickSetup {
    #[must_use]
    pub fn prompt(&self) -> String {
        format!(
            "Set up a pipeline for {} at {} with {} files",
            self.cloud, self.url, self.format
        )
    }
}
