use thiserror::Error;

/// Failures surfaced by the search and dashboard data layer.
///
/// None of these are fatal: dispatchers and aggregators catch them at their
/// boundary and turn them into view state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned an error (status: {status:?}): {}", .message.as_deref().unwrap_or("no message"))]
    Http {
        status: Option<u16>,
        message: Option<String>,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The message shown to the operator.
    ///
    /// Backend-reported messages and validation messages are shown as is;
    /// everything else collapses to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Http {
                message: Some(msg), ..
            } if !msg.is_empty() => msg.clone(),
            _ => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Http {
                status: Some(status.as_u16()),
                message: None,
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(e.to_string())
    }
}
