use thiserror::Error;

/// Custom error type for AH32 operations.
#[derive(Debug, Error)]
pub enum Ah32Error {
    /// Missing or malformed configuration (fatal at startup).
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM or embedding provider call failed.
    #[error("LLM error: {0}")]
    Llm(String),

    /// An operation exceeded its time budget.
    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persisted state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested record was not found.
    #[error("Not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },

    /// Conflicting request (e.g. host mismatch between request and payload).
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Ah32Error {
    pub fn timeout(operation: impl Into<String>) -> Self {
        Ah32Error::Timeout {
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for Ah32Error {
    fn from(err: serde_json::Error) -> Self {
        Ah32Error::Storage(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for Ah32Error {
    fn from(err: std::io::Error) -> Self {
        Ah32Error::Storage(format!("I/O error: {}", err))
    }
}

impl From<reqwest::Error> for Ah32Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Ah32Error::timeout("provider request")
        } else {
            Ah32Error::Llm(err.to_string())
        }
    }
}
