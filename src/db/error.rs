//! Database error types.

use derive_more::{Display, Error};

/// Step of a storage operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DbStage {
    /// Opening or configuring the connection.
    Connect,
    /// Applying schema migrations.
    Migrate,
    /// Running a statement.
    Query,
    /// Turning a stored row back into a ledger value.
    Decode,
}

/// Database error with the failing stage and source location.
#[derive(Debug, Clone, Display, Error)]
#[display("Database {} error: {} at {}:{}", stage, message, file, line)]
pub struct DbError {
    /// Where in the operation it failed.
    pub stage: DbStage,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl DbError {
    /// Query-stage error at the caller's location.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::at(DbStage::Query, message)
    }

    /// Error in `stage` at the caller's location.
    #[track_caller]
    pub fn at(stage: DbStage, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            stage,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<diesel::result::Error> for DbError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        Self::at(DbStage::Query, err.to_string())
    }
}

impl From<diesel::ConnectionError> for DbError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::at(DbStage::Connect, err.to_string())
    }
}
