use thiserror::Error;

pub use eventmesh_core::error::CoreError;

/// Pipeline-local error type. Wraps `CoreError` (the taxonomy shared
/// with `eventmesh-core`) and adds the outbound-call failure shapes
/// specific to this crate.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("circuit open, fallback engaged for {0}")]
    CircuitOpen(String),

    #[error("degraded: {0}")]
    Degraded(String),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Transient(_) | PipelineError::Http(_))
    }
}

impl crate::resilience::Classify for PipelineError {
    fn is_transient(&self) -> bool {
        PipelineError::is_transient(self)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
