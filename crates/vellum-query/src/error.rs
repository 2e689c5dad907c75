use std::fmt;

/// User-facing aggregation stage error.
///
/// Carries the wire-protocol error code alongside the message so the host
/// layer can surface both. These are always caller mistakes: the statement
/// is aborted and the request can be corrected and retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub code: u16,
    pub message: String,
}

impl StageError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        StageError {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for StageError {}
