//! Error types for the web research service.

use research_core::ResearchError;

/// Top-level error type for the service layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Error raised by the research pipeline.
    #[error(transparent)]
    Research(#[from] ResearchError),

    /// Configuration file or environment override error.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed command or payload on the host protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel or stream error on the host bridge.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ServiceError>;
