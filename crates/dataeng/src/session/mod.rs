//! Remote query sessions.
//!
//! Everything this tool does against the warehouse goes through [`Session`]:
//! one SQL statement in, one tabular result out. [`rest::RestSession`] talks to
//! the Snowflake SQL API; tests substitute scripted implementations.

pub mod bootstrap;
pub mod rest;

use serde_json::{Map, Value};
use thiserror::Error;

pub use bootstrap::{BootstrapError, BootstrappedSession, SessionSource, TokenType, bootstrap};
pub use rest::RestSession;

/// Positional bind value for a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Text(String),
}

impl Binding {
    #[must_use]
    pub const fn wire_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "TEXT",
        }
    }

    #[must_use]
    pub fn wire_value(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

impl Statement {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn bind_text(mut self, value: impl Into<String>) -> Self {
        self.bindings.push(Binding::Text(value.into()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Case-insensitive column lookup; the warehouse upper-cases unquoted names.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|values| values.get(index))
    }

    #[must_use]
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Column names keyed off the first row, in result order.
    #[must_use]
    pub fn first_row_columns(&self) -> Option<Vec<String>> {
        let first = self.rows.first()?;
        Some(
            self.columns
                .iter()
                .take(first.len())
                .cloned()
                .collect(),
        )
    }

    #[must_use]
    pub fn rows_as_objects(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (column, value) in self.columns.iter().zip(row) {
                    object.insert(column.clone(), value.clone());
                }
                Value::Object(object)
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("SQL error {code} ({sql_state}): {message}")]
    Statement {
        code: String,
        sql_state: String,
        message: String,
        statement_handle: Option<String>,
    },

    #[error("unexpected HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to decode SQL API response: {0}")]
    Decode(String),

    #[error("statement did not finish within {seconds}s")]
    Timeout { seconds: u64 },
}

pub trait Session {
    fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SessionError>;
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SessionError> {
        (**self).execute(statement)
    }
}

impl<S: Session + ?Sized> Session for &mut S {
    fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SessionError> {
        (**self).execute(statement)
    }
}
