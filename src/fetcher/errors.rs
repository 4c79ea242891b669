use reqwest::StatusCode;
use thiserror::Error;

use crate::error::TransferError;

/// Failure of one HTTP exchange, whether a page, an API call, a media
/// download or an upload.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("request timeout")]
    RequestTimeout,

    #[error("too many redirects")]
    RedirectLoop,

    #[error("http error {status}")]
    Http { status: StatusCode, retriable: bool },

    #[error("body too large ({0} bytes)")]
    BodyTooLarge(u64),

    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("charset error: {0}")]
    Charset(String),

    /// Body arrived but is not the expected JSON or text.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Non-success status; server errors may be retried.
    pub fn status(status: StatusCode) -> Self {
        Self::Http {
            status,
            retriable: status.is_server_error(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http { retriable, .. } => *retriable,
            Self::Connect(_)
            | Self::ConnectTimeout
            | Self::RequestTimeout
            | Self::RedirectLoop
            | Self::Io(_)
            | Self::Other(_) => true,
            Self::InvalidUrl(_)
            | Self::BodyTooLarge(_)
            | Self::UnsupportedContentType(_)
            | Self::Charset(_)
            | Self::Decode(_) => false,
        }
    }

    /// The server refused the request's session (login expired or missing).
    pub fn is_session_rejected(&self) -> bool {
        matches!(
            self,
            Self::Http { status, .. } if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return if err.is_connect() {
                Self::ConnectTimeout
            } else {
                Self::RequestTimeout
            };
        }
        if err.is_redirect() {
            return Self::RedirectLoop;
        }
        if let Some(status) = err.status() {
            return Self::status(status);
        }
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

impl From<FetchError> for TransferError {
    fn from(err: FetchError) -> Self {
        TransferError::NetworkOrPage(err.to_string())
    }
}
