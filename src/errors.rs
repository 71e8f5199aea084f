use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Network(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("failed to parse {0}")]
    Parse(String),
    #[error("upstream reported: {0}")]
    Upstream(String),
    #[error("no match for address: {0}")]
    NoMatch(String),
    #[error("{0}")]
    Config(String),
    #[error("a refresh run is already in progress")]
    Busy,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Whether a retry may help: network hiccups, bad gateway statuses and
    /// garbled bodies are worth another attempt, a missing credential or an
    /// empty result set is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Status(_) | AppError::Parse(_) | AppError::Json(_)
        )
    }
}

/// Truncate upstream payloads before they end up in an error message, so a
/// misbehaving backend cannot flood the logs.
pub fn excerpt(body: &str, max_len: usize) -> String {
    if body.len() <= max_len {
        return body.to_string();
    }
    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
