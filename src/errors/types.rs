//! Error type definitions for the guide service
//!
//! Errors are grouped by the stage that produces them: fetching a remote
//! document, decoding it, and interpreting individual records.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Remote document could not be retrieved
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Retrieved bytes could not be turned into a usable document
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A single playlist record or schedule entry could not be interpreted.
    /// Callers absorb this by dropping the record.
    #[error("Malformed record: {context} - {reason}")]
    MalformedRecord { context: String, reason: String },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Every document of a multi-source batch failed
    #[error("All {attempted} source document(s) failed, last error: {last_error}")]
    AllSourcesFailed { attempted: usize, last_error: String },
}

/// Network-level failures while retrieving a document
#[derive(Error, Debug)]
pub enum FetchError {
    /// Request exceeded its deadline
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Remote answered with a non-success status
    #[error("HTTP error: {status} - {url}")]
    Status { status: u16, url: String },

    /// Connection, TLS or body transfer failure
    #[error("Network error: {url} - {message}")]
    Network { url: String, message: String },

    /// Source specification did not contain any URL
    #[error("No source URL configured")]
    EmptySource,
}

/// Failures turning fetched bytes into text or structure
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Content is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("XML parsing error at byte {position}: {message}")]
    Xml { position: u64, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    pub fn malformed<C: Into<String>, R: Into<String>>(context: C, reason: R) -> Self {
        Self::MalformedRecord {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl FetchError {
    pub fn network<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }
}
