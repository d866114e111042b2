use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::CommandFailed(message.into())
    }
}

/// Failure of a pluggable value decoder on a single value.
///
/// Localized to the value it occurred on; callers substitute a placeholder
/// row instead of propagating.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
