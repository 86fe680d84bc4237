use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("DIRECTIVE_INVALID: {0}")]
    Directive(String),
    #[error("CHART_FAILURE: {0}")]
    Chart(String),
    #[error("HTTP_FAILURE: {0}")]
    Http(String),
    #[error("NETWORK_UNREACHABLE: {0}")]
    Connectivity(String),
    #[error("TIMEOUT: {0}")]
    Timeout(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_connect() {
            Self::Connectivity(value.to_string())
        } else if value.is_timeout() {
            Self::Timeout(value.to_string())
        } else {
            Self::Http(value.to_string())
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
