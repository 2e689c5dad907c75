use std::fmt;

use vellum_engine::EngineError;
use vellum_query::StageError;
use vellum_store::StoreError;

#[derive(Debug)]
pub enum DbError {
    Engine(EngineError),
    Store(StoreError),
    /// User input error with a wire-protocol code; the statement is aborted
    /// and the caller can correct the request.
    Stage(StageError),
    InvalidQuery(String),
    /// Planner/executor contract violation; never retried.
    Internal(String),
    /// Process/session setup problem; requires administrator action.
    Configuration(String),
    /// Cooperative cancellation between per-document evaluation steps.
    Interrupted,
    Io(std::io::Error),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Engine(e) => write!(f, "engine error: {e}"),
            DbError::Store(e) => write!(f, "store error: {e}"),
            DbError::Stage(e) => write!(f, "{e}"),
            DbError::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            DbError::Internal(msg) => write!(f, "internal error: {msg}"),
            DbError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            DbError::Interrupted => write!(f, "statement interrupted"),
            DbError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<EngineError> for DbError {
    fn from(e: EngineError) -> Self {
        DbError::Engine(e)
    }
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        DbError::Store(e)
    }
}

impl From<StageError> for DbError {
    fn from(e: StageError) -> Self {
        DbError::Stage(e)
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e)
    }
}
