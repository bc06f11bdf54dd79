//! Error handling for the deimos engine
//!
//! Every externally observable failure becomes a structured
//! `{"status":"error", ...}` response; the variants here follow the
//! engine's failure taxonomy so handlers can decide what is fatal for a
//! request and what is log-and-continue.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("alias not approved")]
    NotApproved,

    #[error("request too large")]
    RequestTooLarge,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("{0}")]
    Invalid(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("report error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Wire representation of this error.
    ///
    /// Authorization failures always serialize to the same generic
    /// wording regardless of cause, so a caller cannot probe which
    /// aliases exist.
    pub fn to_response(&self) -> serde_json::Value {
        let message = match self {
            EngineError::Unauthorized => "unauthorized".to_string(),
            EngineError::NotApproved => "alias not approved".to_string(),
            EngineError::RequestTooLarge => "request too large".to_string(),
            EngineError::Malformed(_) => "malformed request".to_string(),
            other => other.to_string(),
        };
        serde_json::json!({"status": "error", "error": message})
    }
}
