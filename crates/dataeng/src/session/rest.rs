use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{QueryResult, Session, SessionError, Statement, TokenType};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Session defaults sent with every statement in place of `USE ...` commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementContext {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

pub struct RestSession {
    client: Client,
    base_url: String,
    token: String,
    token_type: TokenType,
    context: StatementContext,
    timeout: Duration,
}

impl std::fmt::Debug for RestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSession")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("context", &self.context)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, WireBinding>,
}

#[derive(Debug, Serialize)]
struct WireBinding {
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    code: Option<String>,
    message: Option<String>,
    sql_state: Option<String>,
    statement_handle: Option<String>,
    statement_status_url: Option<String>,
    result_set_meta_data: Option<ResultSetMetaData>,

    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,

    #[serde(default)]
    partition_info: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

enum Progress {
    Done(StatementResponse),
    Pending { status_url: String },
}

impl RestSession {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        token_type: TokenType,
        context: StatementContext,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("dataeng/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout + CLIENT_TIMEOUT_SLACK)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            token_type,
            context,
            timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn context(&self) -> &StatementContext {
        &self.context
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(
                "X-Snowflake-Authorization-Token-Type",
                self.token_type.header_value(),
            )
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn submit(&self, statement: &Statement) -> Result<Progress, SessionError> {
        let url = format!(
            "{}{STATEMENTS_PATH}?requestId={}",
            self.base_url,
            Uuid::new_v4()
        );
        let bindings = statement
            .bindings
            .iter()
            .enumerate()
            .map(|(index, binding)| {
                (
                    (index + 1).to_string(),
                    WireBinding {
                        kind: binding.wire_type(),
                        value: binding.wire_value(),
                    },
                )
            })
            .collect();
        let request = StatementRequest {
            statement: &statement.sql,
            timeout: self.timeout.as_secs(),
            database: self.context.database.as_deref(),
            schema: self.context.schema.as_deref(),
            warehouse: self.context.warehouse.as_deref(),
            role: self.context.role.as_deref(),
            bindings,
        };

        debug!(
            sql = %statement.sql,
            bindings = statement.bindings.len(),
            "submitting statement"
        );
        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .map_err(|source| SessionError::Transport {
                url: url.clone(),
                source,
            })?;
        read_progress(&url, response)
    }

    fn poll(&self, status_url: &str) -> Result<Progress, SessionError> {
        let url = self.absolute_url(status_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .map_err(|source| SessionError::Transport {
                url: url.clone(),
                source,
            })?;
        read_progress(&url, response)
    }

    fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>, SessionError> {
        let url = format!(
            "{}{STATEMENTS_PATH}/{handle}?partition={partition}",
            self.base_url
        );
        debug!(handle, partition, "fetching result partition");
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .map_err(|source| SessionError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = read_body(&url, response)?;
        if status != StatusCode::OK {
            return Err(error_from_body(status, &body));
        }
        let decoded: PartitionResponse = serde_json::from_str(&body)
            .map_err(|error| SessionError::Decode(format!("partition {partition}: {error}")))?;
        Ok(decoded.data)
    }

    fn absolute_url(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{path_or_url}", self.base_url)
        }
    }
}

impl Session for RestSession {
    fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SessionError> {
        let started = Instant::now();
        let mut progress = self.submit(statement)?;

        let response = loop {
            match progress {
                Progress::Done(response) => break response,
                Progress::Pending { status_url } => {
                    if started.elapsed() >= self.timeout {
                        return Err(SessionError::Timeout {
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                    progress = self.poll(&status_url)?;
                }
            }
        };

        let metadata = response.result_set_meta_data.unwrap_or_default();
        let columns: Vec<String> = metadata.row_type.into_iter().map(|row| row.name).collect();
        let mut raw_rows = response.data;
        if metadata.partition_info.len() > 1 {
            let handle = response.statement_handle.ok_or_else(|| {
                SessionError::Decode("partitioned result without statementHandle".to_string())
            })?;
            for partition in 1..metadata.partition_info.len() {
                raw_rows.extend(self.fetch_partition(&handle, partition)?);
            }
        }

        debug!(
            rows = raw_rows.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "statement completed"
        );
        Ok(QueryResult {
            columns,
            rows: raw_rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|cell| cell.map_or(Value::Null, Value::String))
                        .collect()
                })
                .collect(),
        })
    }
}

fn read_body(url: &str, response: Response) -> Result<String, SessionError> {
    response.text().map_err(|source| SessionError::Transport {
        url: url.to_string(),
        source,
    })
}

fn read_progress(url: &str, response: Response) -> Result<Progress, SessionError> {
    let status = response.status();
    let body = read_body(url, response)?;

    match status {
        StatusCode::OK => serde_json::from_str::<StatementResponse>(&body)
            .map(Progress::Done)
            .map_err(|error| SessionError::Decode(error.to_string())),
        StatusCode::ACCEPTED => {
            let pending: StatementResponse = serde_json::from_str(&body)
                .map_err(|error| SessionError::Decode(error.to_string()))?;
            let status_url = pending
                .statement_status_url
                .or_else(|| {
                    pending
                        .statement_handle
                        .map(|handle| format!("{STATEMENTS_PATH}/{handle}"))
                })
                .ok_or_else(|| {
                    SessionError::Decode("202 response without statementStatusUrl".to_string())
                })?;
            Ok(Progress::Pending { status_url })
        }
        _ => Err(error_from_body(status, &body)),
    }
}

fn error_from_body(status: StatusCode, body: &str) -> SessionError {
    match serde_json::from_str::<StatementResponse>(body) {
        Ok(StatementResponse {
            code: Some(code),
            message: Some(message),
            sql_state,
            statement_handle,
            ..
        }) => SessionError::Statement {
            code,
            sql_state: sql_state.unwrap_or_default(),
            message,
            statement_handle,
        },
        _ => SessionError::Http {
            status: status.as_u16(),
            body: body.trim().to_string(),
        },
    }
}
