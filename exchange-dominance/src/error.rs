use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to callers of the [`VolumeAnalyzer`](crate::VolumeAnalyzer).
///
/// Upstream failures never appear here: they are absorbed into the
/// [`ErrorLedger`](crate::ledger::ErrorLedger) and the affected exchange is left out of the
/// resulting dataset. Only contract violations propagate.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum AnalyzerError {
    #[error("invalid day count {days}: must be within {min}..={max}")]
    InvalidDays { days: u32, min: u32, max: u32 },

    #[error("failed to build HTTP client for {exchange}: {message}")]
    HttpClient { exchange: String, message: String },
}

/// Classification of an [`ApiError`] that drives the retry decision.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum ErrorKind {
    /// Timeouts, connection resets and 5xx responses.
    #[display("transient_network")]
    TransientNetwork,

    /// HTTP 429 or an exchange specific "too many requests" code.
    #[display("rate_limited")]
    RateLimited,

    /// HTTP 403 or an equivalent ban / geo restriction.
    #[display("access_denied")]
    AccessDenied,

    /// Any other 4xx response. The request itself is wrong, repeating it cannot help.
    #[display("rejected")]
    Rejected,

    /// Body did not have the expected shape.
    #[display("malformed_response")]
    MalformedResponse,

    /// Requested symbol is not listed on the venue.
    #[display("unsupported_asset")]
    UnsupportedAsset,
}

/// All errors generated while talking to an upstream exchange API.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum ApiError {
    #[error("request timeout: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limit exceeded (status {status:?}): {message}")]
    RateLimited { status: Option<u16>, message: String },

    #[error("access denied (status {status:?}): {message}")]
    AccessDenied { status: Option<u16>, message: String },

    #[error("server error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("request rejected (status {status:?}): {message}")]
    Rejected { status: Option<u16>, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),
}

impl ApiError {
    /// Map a non-success HTTP status and its body onto an [`ApiError`].
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body, 200);

        match status {
            429 | 418 => Self::RateLimited {
                status: Some(status),
                message,
            },
            403 | 451 => Self::AccessDenied {
                status: Some(status),
                message,
            },
            408 => Self::Timeout(message),
            500..=599 => Self::Status { status, message },
            _ if mentions_unknown_symbol(body) => Self::UnsupportedAsset(message),
            _ => Self::Rejected {
                status: Some(status),
                message,
            },
        }
    }

    /// Determine the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Timeout(_) | ApiError::Network(_) | ApiError::Status { .. } => {
                ErrorKind::TransientNetwork
            }
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::AccessDenied { .. } => ErrorKind::AccessDenied,
            ApiError::Rejected { .. } => ErrorKind::Rejected,
            ApiError::Malformed(_) => ErrorKind::MalformedResponse,
            ApiError::UnsupportedAsset(_) => ErrorKind::UnsupportedAsset,
        }
    }

    /// HTTP status code associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { status, .. }
            | ApiError::AccessDenied { status, .. }
            | ApiError::Rejected { status, .. } => *status,
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout(error.to_string());
        }

        if error.is_decode() {
            return Self::Malformed(error.to_string());
        }

        match error.status() {
            Some(status) => Self::from_status(status.as_u16(), &error.to_string()),
            None => Self::Network(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Malformed(error.to_string())
    }
}

/// Heuristic used by several venues which answer an unknown market with a 400 / 404.
pub(crate) fn mentions_unknown_symbol(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("invalid symbol")
        || message.contains("unknown asset pair")
        || message.contains("symbol invalid")
        || message.contains("symbol not found")
        || message.contains("not found market")
        || message.contains("doesn't exist")
        || message.contains("does not exist")
        || message.contains("notfoundproduct")
        || message.contains("\"notfound\"")
        || message.contains("code not found")
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_string(),
    }
}
