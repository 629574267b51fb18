use thiserror::Error;

/// Navigation pipeline error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error("Sensor not available: {0}")]
    SensorUnavailable(&'static str),

    #[error("No reading yet: {0}")]
    NoReading(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for pipeline operations
pub type NavResult<T> = Result<T, NavError>;

impl From<std::io::Error> for NavError {
    fn from(err: std::io::Error) -> Self {
        NavError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for NavError {
    fn from(err: serde_json::Error) -> Self {
        NavError::Serialization(err.to_string())
    }
}
