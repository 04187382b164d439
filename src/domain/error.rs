use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Protocol(String),

    #[error("Cannot decode image: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid catalog: {0}")]
    Catalog(String),

    #[error("A refresh is already in progress")]
    RefreshInProgress,

    #[error("UI error: {0}")]
    Ui(String),
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Request(e) => AppError::Transport(e.to_string()),
            other => AppError::Protocol(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}
