use thiserror::Error;

/// Error taxonomy shared by every stage of the pipeline.
///
/// `Transient`/`Permanent` distinguish retry-eligible failures from ones
/// that should fail fast; `Race` marks a concurrent-write conflict that
/// callers should treat as success after a re-read.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("concurrent write race on {0}, retry the read")]
    Race(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("degraded: {0}")]
    Degraded(String),

    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

impl CoreError {
    /// Whether a failure of this kind is eligible for retry/circuit-breaker tracking.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
