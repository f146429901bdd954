//! Error types for request execution.
//!
//! Helper constructors carry the URL or path into the error, so there is no
//! blanket `From<reqwest::Error>` or `From<std::io::Error>` impl.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionError;

/// Errors returned by [`RequestExecutor`](super::RequestExecutor).
#[derive(Debug, Error)]
pub enum FetchError {
    /// The session was closed or is otherwise unusable.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Connection, DNS, TLS or protocol failure after retries were exhausted.
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The exchange exceeded its timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The URL could not be parsed or uses an unsupported scheme.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// The request body could not be encoded.
    #[error("invalid request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// A per-call header override is not a valid header.
    #[error("invalid header override {name:?}: {reason}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A download received a non-success status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// Final URL of the exchange.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// The download destination cannot be opened for writing.
    #[error("can't write file {path}: {source}")]
    CantWriteFile {
        /// Destination that was refused.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the body to an already opened destination failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Maps a reqwest error to [`Timeout`](Self::Timeout) or [`Network`](Self::Network).
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header override error.
    pub fn invalid_header(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a destination-not-writable error.
    pub fn cant_write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CantWriteFile {
            path: path.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the session was closed.
    #[must_use]
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::Session(SessionError::Closed))
    }

    /// Returns true for transport failures (network or timeout).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}
