use http::StatusCode;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum WriteError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HTTP {status}: {message}")]
    Http {
        status: StatusCode,
        /// Server supplied `Retry-After` hint in seconds.
        retry_after: Option<u64>,
        message: String,
    },

    #[error("Missing authentication token")]
    MissingToken,

    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("Invalid Scheme: {0}")]
    InvalidScheme(String),

    #[error("Invalid paramter: {0} value: {1}")]
    InvalidParameter(String, String),

    #[error("Invalid timestamp precision: {0}")]
    InvalidTimestampPrecision(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error("SSL Certificate error: {0}")]
    SSLCertificateError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl WriteError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        WriteError::InvalidArgument(message.into())
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            WriteError::Http { status, .. } => Some(*status),
            WriteError::ReqwestError(e) => e.status(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            WriteError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
