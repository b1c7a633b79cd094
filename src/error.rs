//! Error types shared by every component of the notifier.
//!
//! Fatal failures bubble up to the runner, which writes the `failed` status
//! and posts the Slack alert. Base64 decode failures never leave the
//! extractor; a structurally malformed message does.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifierError {
    /// A required setting is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The credential is invalid, expired, or was rejected by the API.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The API was unreachable or answered with a non-2xx status.
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// Message content could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The message lacks a field extraction depends on.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotifierError>;

impl NotifierError {
    pub fn missing_env(key: &str) -> Self {
        Self::Config(format!("Environment variable {key} is required"))
    }

    pub(crate) fn transport(service: &'static str, err: reqwest::Error) -> Self {
        Self::Transport {
            service,
            message: err.to_string(),
        }
    }

    /// Classify a non-2xx response: 401/403 are credential problems,
    /// everything else is a transport failure.
    pub(crate) fn from_status(service: &'static str, status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Auth(format!("{service} returned HTTP {status}: {body}"))
            }
            _ => Self::Transport {
                service,
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
