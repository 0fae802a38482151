//! Pipeline tracker records and the read-only previews behind them.

pub mod identifier;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::config::WorkspaceTarget;
use crate::session::{QueryResult, Session, SessionError, Statement};
use crate::utils::time::format_epoch_text;
use crate::utils::value_text;

pub use identifier::{IdentifierError, QualifiedName, validate_identifier};

pub const TRACKER_TABLE: &str = "DATA_PIPELINE_TRACKER";
pub const RECENT_PIPELINES_LIMIT: u32 = 10;
pub const STAGE_COLUMN_COUNT: usize = 23;
pub const SUCCESS_STATUS: &str = "SUCCESS";

const SHORT_ID_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RowLimit(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("row limit must be between {min} and {max}, got {value}", min = RowLimit::MIN, max = RowLimit::MAX)]
pub struct RowLimitError {
    pub value: u32,
}

impl RowLimit {
    pub const MIN: u32 = 10;
    pub const MAX: u32 = 1_000;
    pub const DEFAULT: u32 = 100;

    pub fn new(value: u32) -> Result<Self, RowLimitError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(RowLimitError { value })
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for RowLimit {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl Display for RowLimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowLimit {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value: u32 = raw
            .trim()
            .parse()
            .map_err(|_| format!("row limit must be an integer, got `{raw}`"))?;
        Self::new(value).map_err(|error| error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRecord {
    pub pipeline_id: String,
    pub data_source_type: String,
    pub table_name: String,
    pub stage_name: String,
    pub file_format_name: String,
    pub status: String,
    pub created_at: String,
}

impl PipelineRecord {
    /// Reads row `row` of a tracker result; absent columns become empty strings.
    #[must_use]
    pub fn from_row(result: &QueryResult, row: usize) -> Self {
        let text = |column: &str| {
            result
                .cell(row, column)
                .map(value_text)
                .unwrap_or_default()
        };

        Self {
            pipeline_id: text("PIPELINE_ID"),
            data_source_type: text("DATA_SOURCE_TYPE"),
            table_name: text("TABLE_NAME"),
            stage_name: text("STAGE_NAME"),
            file_format_name: text("FILE_FORMAT_NAME"),
            status: text("STATUS"),
            created_at: format_epoch_text(&text("CREATED_AT")),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.pipeline_id, self.data_source_type)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }

    #[must_use]
    pub fn status_marker(&self) -> &'static str {
        if self.is_success() { "✅" } else { "❌" }
    }

    /// First 20 characters of the id followed by `...`.
    #[must_use]
    pub fn short_id(&self) -> String {
        let prefix: String = self.pipeline_id.chars().take(SHORT_ID_CHARS).collect();
        format!("{prefix}...")
    }
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no pipeline matches `{selector}`; available: {}", .available.join(", "))]
pub struct SelectionError {
    pub selector: String,
    pub available: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub count: usize,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagePreview {
    pub result: QueryResult,
    pub column_info: Option<ColumnInfo>,
}

fn tracker_name(target: &WorkspaceTarget) -> Result<QualifiedName, IdentifierError> {
    QualifiedName::new(&target.database, &target.schema, "tracker table", TRACKER_TABLE)
}

pub fn list_pipelines_statement(target: &WorkspaceTarget) -> Result<Statement, IdentifierError> {
    Ok(Statement::new(format!(
        "SELECT PIPELINE_ID, DATA_SOURCE_TYPE, TABLE_NAME, STAGE_NAME, FILE_FORMAT_NAME, STATUS, CREATED_AT FROM {} ORDER BY CREATED_AT DESC",
        tracker_name(target)?
    )))
}

pub fn recent_pipelines_statement(target: &WorkspaceTarget) -> Result<Statement, IdentifierError> {
    Ok(Statement::new(format!(
        "SELECT PIPELINE_ID, DATA_SOURCE_TYPE, STATUS, CREATED_AT, TABLE_NAME FROM {} ORDER BY CREATED_AT DESC LIMIT {RECENT_PIPELINES_LIMIT}",
        tracker_name(target)?
    )))
}

pub fn table_query_statement(
    target: &WorkspaceTarget,
    record: &PipelineRecord,
    limit: RowLimit,
) -> Result<Statement, IdentifierError> {
    let table = QualifiedName::new(&target.database, &target.schema, "table", &record.table_name)?;
    Ok(Statement::new(format!("SELECT * FROM IDENTIFIER(?) LIMIT {limit}")).bind_text(table.to_string()))
}

pub fn stage_listing_statement(
    target: &WorkspaceTarget,
    record: &PipelineRecord,
) -> Result<Statement, IdentifierError> {
    let stage = QualifiedName::new(&target.database, &target.schema, "stage", &record.stage_name)?;
    Ok(Statement::new(format!("LIST @{stage}")))
}

pub fn stage_query_statement(
    target: &WorkspaceTarget,
    record: &PipelineRecord,
    limit: RowLimit,
) -> Result<Statement, IdentifierError> {
    let stage = QualifiedName::new(&target.database, &target.schema, "stage", &record.stage_name)?;
    let file_format = QualifiedName::new(
        &target.database,
        &target.schema,
        "file format",
        &record.file_format_name,
    )?;
    let columns = (1..=STAGE_COLUMN_COUNT)
        .map(|position| format!("${position}"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(Statement::new(format!(
        "SELECT {columns} FROM @{stage} (FILE_FORMAT => '{file_format}') LIMIT {limit}"
    )))
}

fn records_from(result: &QueryResult) -> Vec<PipelineRecord> {
    (0..result.len())
        .map(|row| PipelineRecord::from_row(result, row))
        .collect()
}

/// All tracked pipelines, newest first.
pub fn list_pipelines<S: Session + ?Sized>(
    session: &mut S,
    target: &WorkspaceTarget,
) -> Result<Vec<PipelineRecord>, PreviewError> {
    let result = session.execute(&list_pipelines_statement(target)?)?;
    Ok(records_from(&result))
}

/// The ten most recent pipelines, for the console tracker panel.
pub fn recent_pipelines<S: Session + ?Sized>(
    session: &mut S,
    target: &WorkspaceTarget,
) -> Result<Vec<PipelineRecord>, PreviewError> {
    let result = session.execute(&recent_pipelines_statement(target)?)?;
    Ok(records_from(&result))
}

/// In-memory selection by id or display label; `None` picks the newest record.
pub fn select_pipeline<'a>(
    records: &'a [PipelineRecord],
    selector: Option<&str>,
) -> Result<&'a PipelineRecord, SelectionError> {
    let Some(selector) = selector.map(str::trim).filter(|value| !value.is_empty()) else {
        return records.first().ok_or_else(|| SelectionError {
            selector: String::new(),
            available: Vec::new(),
        });
    };

    records
        .iter()
        .find(|record| record.pipeline_id == selector || record.label() == selector)
        .ok_or_else(|| SelectionError {
            selector: selector.to_string(),
            available: records.iter().map(|record| record.pipeline_id.clone()).collect(),
        })
}

pub fn query_table<S: Session + ?Sized>(
    session: &mut S,
    target: &WorkspaceTarget,
    record: &PipelineRecord,
    limit: RowLimit,
) -> Result<QueryResult, PreviewError> {
    let statement = table_query_statement(target, record, limit)?;
    Ok(session.execute(&statement)?)
}

pub fn list_stage_files<S: Session + ?Sized>(
    session: &mut S,
    target: &WorkspaceTarget,
    record: &PipelineRecord,
) -> Result<QueryResult, PreviewError> {
    let statement = stage_listing_statement(target, record)?;
    Ok(session.execute(&statement)?)
}

pub fn query_stage<S: Session + ?Sized>(
    session: &mut S,
    target: &WorkspaceTarget,
    record: &PipelineRecord,
    limit: RowLimit,
) -> Result<StagePreview, PreviewError> {
    let statement = stage_query_statement(target, record, limit)?;
    let result = session.execute(&statement)?;
    let column_info = result.first_row_columns().map(|names| ColumnInfo {
        count: names.len(),
        names,
    });

    Ok(StagePreview {
        result,
        column_info,
    })
}
