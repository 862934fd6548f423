use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("event {event_id} not found")]
    NotFound { event_id: String },
    #[error("nothing to delete for {scope}")]
    EmptySelection { scope: String },
    #[error("student {student_id} is not on the roster")]
    UnresolvableOwner { student_id: String },
    #[error("score for {student_id} is {actual}, expected {expected}")]
    InvariantViolation {
        student_id: String,
        expected: i64,
        actual: i32,
    },
    #[error("score for {student_id} would leave the representable range")]
    ScoreOverflow { student_id: String },
    #[error("unparseable date: {0:?}")]
    UnparseableDate(String),
    #[error("event {0} already recorded")]
    DuplicateEvent(String),
    #[error("student {0} already on the roster")]
    DuplicateStudent(String),
    #[error("student {0} not found")]
    StudentNotFound(String),
    #[error("invalid calendar: {0}")]
    InvalidCalendar(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("csv error: {0}")]
    Csv(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<csv::Error> for LedgerError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}
