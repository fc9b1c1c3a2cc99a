//! Error type shared by every component of this crate

use thiserror::Error;

/// Everything that can go wrong while discovering services, talking to a server or uploading contacts
///
/// This type is `Clone` because a single token refresh result is shared between every request
/// that waits for it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DavError {
    /// Timeout, unreachable host, broken connection...
    #[error("network error: {0}")]
    Network(String),

    /// The server answered something we could not make sense of
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request is still unauthorized after the (single) token refresh attempt
    #[error("not authorized: {0}")]
    Auth(String),

    /// The merge service refused the request because the contact set is too large
    #[error("too many contacts")]
    TooManyContacts,

    /// The operation has been cancelled, or its deadline has expired
    #[error("operation cancelled")]
    Cancelled,

    /// An unexpected HTTP status code
    #[error("unexpected HTTP status {status} for {url}")]
    Http { status: u16, url: String },

    /// An external collaborator (account store, local contact store...) failed
    #[error("store error: {0}")]
    Store(String),

    /// The requested transition is not allowed in the current state
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl DavError {
    /// Cancellation is the only error that must cross component boundaries untouched
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DavError::Cancelled)
    }
}

impl From<url::ParseError> for DavError {
    fn from(err: url::ParseError) -> Self {
        DavError::Protocol(format!("invalid URL: {}", err))
    }
}

impl From<minidom::Error> for DavError {
    fn from(err: minidom::Error) -> Self {
        DavError::Protocol(format!("invalid XML: {}", err))
    }
}

impl From<serde_json::Error> for DavError {
    fn from(err: serde_json::Error) -> Self {
        DavError::Protocol(format!("invalid JSON: {}", err))
    }
}

impl From<reqwest::Error> for DavError {
    fn from(err: reqwest::Error) -> Self {
        DavError::Network(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for DavError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        DavError::Protocol(format!("invalid header value: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DavError>;
