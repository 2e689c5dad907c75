use std::fmt;

use vellum_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    /// Adapter/planner contract violation. Non-retriable; aborts the
    /// statement.
    Internal(String),
    /// Process setup problem (registration, missing access method).
    /// Non-retriable without administrator action.
    Configuration(String),
    /// A value or tag outside the supported comparison-order type classes.
    UnsupportedType(String),
    /// Malformed persisted bytes (index term, metadata page).
    Corrupt(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Store(e) => write!(f, "store error: {e}"),
            EngineError::Internal(msg) => write!(f, "internal error: {msg}"),
            EngineError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            EngineError::UnsupportedType(msg) => write!(f, "unsupported type: {msg}"),
            EngineError::Corrupt(msg) => write!(f, "corrupt index data: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
