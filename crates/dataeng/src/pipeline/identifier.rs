use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

const MAX_IDENTIFIER_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("refusing to use {what} `{value}` in SQL: {reason}")]
pub struct IdentifierError {
    pub what: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Checks that `value` is a plain unquoted identifier.
///
/// Stage and file-format names cannot be passed as bind variables, so they
/// are only ever interpolated after passing this check.
pub fn validate_identifier<'a>(what: &'static str, value: &'a str) -> Result<&'a str, IdentifierError> {
    let reject = |reason| IdentifierError {
        what,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(reject("identifier is empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(reject("identifier exceeds 255 characters"));
    }
    if !identifier_regex().is_some_and(|regex| regex.is_match(value)) {
        return Err(reject("only letters, digits, `_` and `$` are allowed, starting with a letter or `_`"));
    }

    Ok(value)
}

fn identifier_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").ok())
        .as_ref()
}

/// `database.schema.object`, each part validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    database: String,
    schema: String,
    object: String,
}

impl QualifiedName {
    pub fn new(
        database: &str,
        schema: &str,
        what: &'static str,
        object: &str,
    ) -> Result<Self, IdentifierError> {
        Ok(Self {
            database: validate_identifier("database", database)?.to_string(),
            schema: validate_identifier("schema", schema)?.to_string(),
            object: validate_identifier(what, object)?.to_string(),
        })
    }

    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.object)
    }
}
