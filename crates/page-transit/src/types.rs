//! Core data types for fetched pages and engine errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable snapshot of a fetched document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    /// Normalized URL the page was resolved to.
    pub url: String,
    /// Raw markup of the page.
    pub html: String,
}

impl PageData {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// Classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    TimedOut,
    Aborted,
    ServerError,
    EmptyResponse,
}

/// A classified failure of the page fetcher.
///
/// At most one of `aborted` / `timed_out` is set; the constructors below are
/// the only way the fetcher builds one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
    pub url: String,
    pub status: Option<u16>,
    pub aborted: bool,
    pub timed_out: bool,
}

impl FetchError {
    /// The request exceeded its timeout and was cancelled by the timer.
    pub fn timed_out(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            message: format!("Request timed out: {url}"),
            url,
            status: None,
            aborted: false,
            timed_out: true,
        }
    }

    /// The request was cancelled through its cancellation signal.
    pub fn aborted(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            message: format!("Request aborted: {url}"),
            url,
            status: None,
            aborted: true,
            timed_out: false,
        }
    }

    /// The server answered with status 500.
    pub fn server_error(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            message: format!("Server error: {url}"),
            url,
            status: Some(status),
            aborted: false,
            timed_out: false,
        }
    }

    /// The server answered with an empty body.
    pub fn empty_response(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            message: format!("Empty response: {url}"),
            url,
            status: Some(status),
            aborted: false,
            timed_out: false,
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        if self.timed_out {
            FetchErrorKind::TimedOut
        } else if self.aborted {
            FetchErrorKind::Aborted
        } else if self.status == Some(500) {
            FetchErrorKind::ServerError
        } else {
            FetchErrorKind::EmptyResponse
        }
    }
}

/// Which document a container lookup failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSide {
    Current,
    Incoming,
}

impl fmt::Display for DocumentSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSide::Current => f.write_str("current document"),
            DocumentSide::Incoming => f.write_str("incoming document"),
        }
    }
}

/// Errors that can occur in the transition engine.
#[derive(thiserror::Error, Debug)]
pub enum TransitError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Hook error in {hook}: {message}")]
    Hook { hook: &'static str, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransitError {
    /// Build a hook error for a handler registered on `hook`.
    pub fn hook(hook: &'static str, message: impl Into<String>) -> Self {
        TransitError::Hook {
            hook,
            message: message.into(),
        }
    }

    /// The classified fetch failure, if this is one.
    pub fn as_fetch_error(&self) -> Option<&FetchError> {
        match self {
            TransitError::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

/// Convenience result type.
pub type TransitResult<T> = Result<T, TransitError>;
