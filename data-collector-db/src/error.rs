use thiserror::Error;

use crate::schema::SchemaError;

/// Errors surfaced by sessions, queries, and mutations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Store failure, passed through unchanged.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {record_type} with id {id}")]
    NotFound { record_type: String, id: i64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Caller misconfiguration, detected before the store is touched.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("SQLite {found} is too old, {required} or newer is required")]
    Driver { found: String, required: &'static str },
}

/// Invalid arguments to a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("delete and update are mutually exclusive")]
    ConflictingRetirePolicy,

    #[error("compare key must name at least one column")]
    EmptyCompareKey,

    #[error("{record_type}: attribute '{column}' is missing or null")]
    MissingKeyColumn { record_type: String, column: String },

    #[error("dataset mixes record types: expected {expected}, found {found}")]
    MixedRecordTypes { expected: String, found: String },

    #[error("{record_type}: record has no identifier")]
    Unidentified { record_type: String },

    #[error("{record_type} has no column '{column}'")]
    UnknownColumn { record_type: String, column: String },

    #[error("query needs at least one target")]
    NoQueryTargets,

    #[error("update_insert needs at least one filter column")]
    NoFilterColumns,

    #[error("only procedure/function calls are allowed: {0}")]
    UnsupportedStatement(String),
}

impl DbError {
    /// The configuration error, if this is one.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            DbError::Config(e) => Some(e),
            _ => None,
        }
    }
}
