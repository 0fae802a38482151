use std::fmt::{Display, Formatter};
use std::io::Write;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::WorkspaceTarget;
use crate::models::{HINT_WARNING_CODE, PreviewEnvelope};
use crate::pipeline::{
    self, ColumnInfo, PipelineRecord, PreviewError, RowLimit, StagePreview, select_pipeline,
};
use crate::session::{QueryResult, Session, SessionError};
use crate::utils::table::{render_key_values, render_result};

pub const NO_PIPELINES_MESSAGE: &str =
    "No pipelines found. Create a pipeline first from the agent console.";
pub const AGENT_CONSOLE_SHORTCUT: &str = "next: dataeng agent chat";
const TABLE_FAILURE_TIP: &str =
    "Tip: try `dataeng preview stage` to query the raw files directly from the stage";
const TABLE_EMPTY_TIP: &str =
    "Tip: try querying the stage directly if the external table returns no data";

#[derive(Debug, Clone, Args)]
pub struct PreviewArgs {
    /// Emit one JSON envelope instead of tables.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: PreviewCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum PreviewCommand {
    /// List tracked pipelines, newest first.
    Pipelines,
    /// Show one pipeline's status, table, source and creation time.
    Show(SelectArgs),
    /// Read rows from the pipeline's external table.
    Table(RowsArgs),
    /// List files in the pipeline's stage.
    Files(SelectArgs),
    /// Read positional columns straight from the staged files.
    Stage(RowsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SelectArgs {
    /// Pipeline id or `<id> (<source>)` label; defaults to the newest pipeline.
    #[arg(long, value_name = "ID")]
    pub pipeline: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RowsArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Number of rows to read (10-1000).
    #[arg(long, value_name = "ROWS", default_value_t = RowLimit::default())]
    pub limit: RowLimit,
}

impl PreviewCommand {
    #[must_use]
    pub fn envelope_command(&self) -> &'static str {
        match self {
            Self::Pipelines => "preview.pipelines",
            Self::Show(_) => "preview.show",
            Self::Table(_) => "preview.table",
            Self::Files(_) => "preview.files",
            Self::Stage(_) => "preview.stage",
        }
    }

    fn selector(&self) -> Option<&str> {
        match self {
            Self::Pipelines => None,
            Self::Show(args) | Self::Files(args) => args.pipeline.as_deref(),
            Self::Table(args) | Self::Stage(args) => args.select.pipeline.as_deref(),
        }
    }

    fn limit(&self) -> Option<RowLimit> {
        match self {
            Self::Table(args) | Self::Stage(args) => Some(args.limit),
            _ => None,
        }
    }
}

/// A preview that rendered an error; the exit status reflects it.
#[derive(Debug, Clone)]
pub struct PreviewCommandFailure {
    pub command: &'static str,
    pub code: String,
    pub message: String,
}

impl Display for PreviewCommandFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed ({}): {}", self.command, self.code, self.message)
    }
}

impl std::error::Error for PreviewCommandFailure {}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewBody {
    NoPipelines,
    Pipelines(Vec<PipelineRecord>),
    Record,
    TableRows(QueryResult),
    StageFiles(QueryResult),
    StageRows(StagePreview),
    Nothing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

/// Everything one preview invocation produced, before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewOutcome {
    pub command: &'static str,
    pub pipeline: Option<PipelineRecord>,
    pub limit: Option<RowLimit>,
    pub body: PreviewBody,
    pub notices: Vec<Notice>,
    pub failure: Option<Failure>,
    pub duration_ms: u64,
}

impl PreviewOutcome {
    fn new(command: &'static str, limit: Option<RowLimit>) -> Self {
        Self {
            command,
            pipeline: None,
            limit,
            body: PreviewBody::Nothing,
            notices: Vec::new(),
            failure: None,
            duration_ms: 0,
        }
    }

    fn notice(&mut self, code: &'static str, message: impl Into<String>) {
        self.notices.push(Notice {
            code,
            message: message.into(),
            details: None,
        });
    }

    fn empty_result(&mut self, message: &str, object: &str) {
        self.notices.push(Notice {
            code: "empty_result",
            message: message.to_string(),
            details: Some(json!({ "object": object })),
        });
    }

    fn fail(&mut self, code: &'static str, message: impl Into<String>, details: Option<Value>) {
        self.failure = Some(Failure {
            code,
            message: message.into(),
            details,
        });
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    #[must_use]
    pub fn row_count(&self) -> Option<usize> {
        match &self.body {
            PreviewBody::Pipelines(records) => Some(records.len()),
            PreviewBody::NoPipelines => Some(0),
            PreviewBody::TableRows(result) | PreviewBody::StageFiles(result) => Some(result.len()),
            PreviewBody::StageRows(preview) => Some(preview.result.len()),
            PreviewBody::Record | PreviewBody::Nothing => None,
        }
    }
}

pub fn run<S: Session + ?Sized>(
    args: &PreviewArgs,
    session: &mut S,
    target: &WorkspaceTarget,
    out: &mut dyn Write,
) -> Result<()> {
    let outcome = execute(&args.command, session, target);
    if args.json {
        let encoded = serde_json::to_string_pretty(&to_envelope(&outcome))
            .context("failed to encode preview envelope")?;
        writeln!(out, "{encoded}")?;
    } else {
        write!(out, "{}", render_text(&outcome))?;
    }
    out.flush()?;

    match outcome.failure {
        Some(failure) => Err(PreviewCommandFailure {
            command: outcome.command,
            code: failure.code.to_string(),
            message: failure.message,
        }
        .into()),
        None => Ok(()),
    }
}

/// Runs one preview; remote failures are captured in the outcome, never raised.
pub fn execute<S: Session + ?Sized>(
    command: &PreviewCommand,
    session: &mut S,
    target: &WorkspaceTarget,
) -> PreviewOutcome {
    let started = Instant::now();
    let mut outcome = PreviewOutcome::new(command.envelope_command(), command.limit());

    let records = match pipeline::list_pipelines(session, target) {
        Ok(records) => records,
        Err(error) => {
            warn!(error = %error, "pipeline listing failed");
            outcome.fail(
                "pipelines_unavailable",
                format!("Error loading pipelines: {error}"),
                error_details(&error),
            );
            outcome.duration_ms = elapsed_ms(started);
            return outcome;
        }
    };
    debug!(count = records.len(), "pipelines listed");

    if records.is_empty() {
        outcome.body = PreviewBody::NoPipelines;
        outcome.notice("no_pipelines", NO_PIPELINES_MESSAGE);
        outcome.notice(HINT_WARNING_CODE, AGENT_CONSOLE_SHORTCUT);
        outcome.duration_ms = elapsed_ms(started);
        return outcome;
    }

    if matches!(command, PreviewCommand::Pipelines) {
        outcome.body = PreviewBody::Pipelines(records);
        outcome.duration_ms = elapsed_ms(started);
        return outcome;
    }

    let record = match select_pipeline(&records, command.selector()) {
        Ok(record) => record.clone(),
        Err(error) => {
            outcome.fail(
                "pipeline_not_found",
                error.to_string(),
                Some(json!({ "selector": error.selector, "available": error.available })),
            );
            outcome.duration_ms = elapsed_ms(started);
            return outcome;
        }
    };
    outcome.pipeline = Some(record.clone());

    match command {
        PreviewCommand::Pipelines | PreviewCommand::Show(_) => outcome.body = PreviewBody::Record,
        PreviewCommand::Table(args) => {
            preview_table(&mut outcome, session, target, &record, args.limit);
        }
        PreviewCommand::Files(_) => preview_files(&mut outcome, session, target, &record),
        PreviewCommand::Stage(args) => {
            preview_stage(&mut outcome, session, target, &record, args.limit);
        }
    }

    outcome.duration_ms = elapsed_ms(started);
    outcome
}

fn preview_table<S: Session + ?Sized>(
    outcome: &mut PreviewOutcome,
    session: &mut S,
    target: &WorkspaceTarget,
    record: &PipelineRecord,
    limit: RowLimit,
) {
    match pipeline::query_table(session, target, record, limit) {
        Ok(result) if result.is_empty() => {
            outcome.empty_result("No data returned from external table", &record.table_name);
            outcome.notice(HINT_WARNING_CODE, TABLE_EMPTY_TIP);
            outcome.body = PreviewBody::TableRows(result);
        }
        Ok(result) => outcome.body = PreviewBody::TableRows(result),
        Err(error) => {
            outcome.fail(
                failure_code(&error, "table_query_failed"),
                format!("Error querying table: {error}"),
                error_details(&error),
            );
            outcome.notice(HINT_WARNING_CODE, TABLE_FAILURE_TIP);
        }
    }
}

fn preview_files<S: Session + ?Sized>(
    outcome: &mut PreviewOutcome,
    session: &mut S,
    target: &WorkspaceTarget,
    record: &PipelineRecord,
) {
    match pipeline::list_stage_files(session, target, record) {
        Ok(result) => {
            if result.is_empty() {
                outcome.empty_result("No files found in stage", &record.stage_name);
            }
            outcome.body = PreviewBody::StageFiles(result);
        }
        Err(error) => {
            outcome.fail(
                failure_code(&error, "stage_listing_failed"),
                format!("Error listing files: {error}"),
                error_details(&error),
            );
        }
    }
}

fn preview_stage<S: Session + ?Sized>(
    outcome: &mut PreviewOutcome,
    session: &mut S,
    target: &WorkspaceTarget,
    record: &PipelineRecord,
    limit: RowLimit,
) {
    match pipeline::query_stage(session, target, record, limit) {
        Ok(preview) => {
            if preview.result.is_empty() {
                outcome.empty_result("No data returned from stage", &record.stage_name);
            }
            outcome.body = PreviewBody::StageRows(preview);
        }
        Err(error) => {
            outcome.fail(
                failure_code(&error, "stage_query_failed"),
                format!("Error querying stage: {error}"),
                error_details(&error),
            );
        }
    }
}

fn failure_code(error: &PreviewError, remote: &'static str) -> &'static str {
    match error {
        PreviewError::Identifier(_) => "identifier_rejected",
        PreviewError::Session(_) => remote,
    }
}

/// Machine-readable context for a failed remote call, carried in the envelope.
fn error_details(error: &PreviewError) -> Option<Value> {
    match error {
        PreviewError::Identifier(rejected) => Some(json!({
            "object": rejected.what,
            "value": rejected.value,
            "reason": rejected.reason,
        })),
        PreviewError::Session(SessionError::Statement {
            code,
            sql_state,
            statement_handle,
            ..
        }) => Some(json!({
            "sql_code": code,
            "sql_state": sql_state,
            "statement_handle": statement_handle,
        })),
        PreviewError::Session(SessionError::Http { status, .. }) => {
            Some(json!({ "http_status": status }))
        }
        PreviewError::Session(SessionError::Timeout { seconds }) => {
            Some(json!({ "timeout_secs": seconds }))
        }
        PreviewError::Session(SessionError::Transport { .. } | SessionError::Decode(_)) => None,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn record_summary(record: &PipelineRecord) -> String {
    render_key_values(&[
        ("Pipeline", record.pipeline_id.clone()),
        ("Status", record.status.clone()),
        ("Table", record.table_name.clone()),
        ("Data Source", record.data_source_type.clone()),
        ("Created", record.created_at.clone()),
    ])
}

fn pipelines_table(records: &[PipelineRecord]) -> String {
    let result = QueryResult {
        columns: ["", "PIPELINE", "SOURCE", "STATUS", "TABLE", "STAGE", "CREATED"]
            .iter()
            .map(|column| (*column).to_string())
            .collect(),
        rows: records
            .iter()
            .map(|record| {
                vec![
                    json!(record.status_marker()),
                    json!(record.pipeline_id),
                    json!(record.data_source_type),
                    json!(record.status),
                    json!(record.table_name),
                    json!(record.stage_name),
                    json!(record.created_at),
                ]
            })
            .collect(),
    };
    render_result(&result)
}

#[must_use]
pub fn render_text(outcome: &PreviewOutcome) -> String {
    let mut lines = Vec::new();

    if let Some(record) = &outcome.pipeline {
        lines.push(record_summary(record));
    }

    match &outcome.body {
        PreviewBody::Pipelines(records) => {
            lines.push(format!("Found {} pipelines", records.len()));
            lines.push(pipelines_table(records));
        }
        PreviewBody::TableRows(result) if !result.is_empty() => {
            if let Some(record) = &outcome.pipeline {
                lines.push(format!("External Table: {}", record.table_name));
            }
            lines.push(format!("Found {} rows", result.len()));
            lines.push(render_result(result));
        }
        PreviewBody::StageFiles(result) if !result.is_empty() => {
            if let Some(record) = &outcome.pipeline {
                lines.push(format!("Stage: {}", record.stage_name));
            }
            lines.push(format!("Found {} files", result.len()));
            lines.push(render_result(result));
        }
        PreviewBody::StageRows(preview) if !preview.result.is_empty() => {
            if let Some(record) = &outcome.pipeline {
                lines.push(format!("Stage: {}", record.stage_name));
            }
            lines.push(format!("Found {} rows", preview.result.len()));
            lines.push(render_result(&preview.result));
            if let Some(info) = &preview.column_info {
                lines.push(format!("Total columns: {}", info.count));
                lines.push(format!("Column names: {}", info.names.join(", ")));
            }
        }
        _ => {}
    }

    if let Some(failure) = &outcome.failure {
        lines.push(format!("error: {}", failure.message));
    }
    for notice in &outcome.notices {
        lines.push(notice.message.clone());
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn result_data(result: &QueryResult) -> Value {
    json!({
        "columns": result.columns,
        "rows": result.rows_as_objects(),
    })
}

fn column_info_data(info: Option<&ColumnInfo>) -> Value {
    info.map_or(Value::Null, |info| json!(info))
}

#[must_use]
pub fn to_envelope(outcome: &PreviewOutcome) -> PreviewEnvelope {
    let mut envelope = match &outcome.failure {
        Some(failure) => {
            let envelope = PreviewEnvelope::error(outcome.command, failure.code, &failure.message);
            match &failure.details {
                Some(details) => envelope.with_error_details(details.clone()),
                None => envelope,
            }
        }
        None => {
            let data = match &outcome.body {
                PreviewBody::NoPipelines => json!({ "pipelines": [] }),
                PreviewBody::Pipelines(records) => json!({ "pipelines": records }),
                PreviewBody::Record => json!({ "pipeline": outcome.pipeline }),
                PreviewBody::TableRows(result) | PreviewBody::StageFiles(result) => {
                    result_data(result)
                }
                PreviewBody::StageRows(preview) => {
                    let mut data = result_data(&preview.result);
                    data["column_info"] = column_info_data(preview.column_info.as_ref());
                    data
                }
                PreviewBody::Nothing => Value::Null,
            };
            PreviewEnvelope::ok(outcome.command, data)
        }
    };

    envelope = envelope.with_meta("duration_ms", json!(outcome.duration_ms));
    if let Some(limit) = outcome.limit {
        envelope = envelope.with_meta("row_limit", json!(limit));
    }
    if let Some(row_count) = outcome.row_count() {
        envelope = envelope.with_meta("row_count", json!(row_count));
    }
    if let Some(record) = &outcome.pipeline {
        envelope = envelope.with_meta("pipeline_id", json!(record.pipeline_id));
    }
    for notice in &outcome.notices {
        envelope = if notice.code == HINT_WARNING_CODE {
            envelope.with_hint(&notice.message)
        } else {
            envelope.with_warning(notice.code, &notice.message)
        };
        if let Some(details) = &notice.details {
            envelope = envelope.with_warning_details(details.clone());
        }
    }
    envelope
}
