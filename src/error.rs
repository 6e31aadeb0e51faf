use thiserror::Error;

/// Crate-level error type.
///
/// Record decode failures, action failures and checkpoint failures are contained by the
/// component that observes them and never surface here. Only construction and configuration
/// problems are meant to propagate to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WatchmanError {
    #[error("Construction error: {0}")]
    Construction(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for WatchmanError {
    fn from(error: serde_json::Error) -> Self {
        WatchmanError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for WatchmanError {
    fn from(error: std::io::Error) -> Self {
        WatchmanError::Io(error.to_string())
    }
}

impl From<crate::config::ConfigurationError> for WatchmanError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        WatchmanError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WatchmanError>;
