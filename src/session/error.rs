//! Error types for session state management.

use thiserror::Error;

/// Errors raised by [`SessionManager`](super::SessionManager) and its parts.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation was attempted after [`close`](super::SessionManager::close).
    #[error("session closed")]
    Closed,

    /// A session handle that was already shut down was offered for installation.
    #[error("session type error: handle {id} is not a usable session ({reason})")]
    InvalidHandle {
        /// Identity of the rejected handle.
        id: u64,
        /// Why the handle was rejected.
        reason: &'static str,
    },

    /// A header name or value cannot be represented on the wire.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl SessionError {
    /// Creates an invalid-header error.
    pub fn invalid_header(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_display_is_plain() {
        assert_eq!(SessionError::Closed.to_string(), "session closed");
    }

    #[test]
    fn test_invalid_handle_display_mentions_type_error() {
        let error = SessionError::InvalidHandle {
            id: 7,
            reason: "handle was shut down",
        };
        let msg = error.to_string();
        assert!(msg.contains("session type error"), "got: {msg}");
        assert!(msg.contains('7'), "got: {msg}");
    }

    #[test]
    fn test_invalid_header_display_names_header() {
        let error = SessionError::invalid_header("X-Bad", "contains newline");
        let msg = error.to_string();
        assert!(msg.contains("X-Bad"), "got: {msg}");
        assert!(msg.contains("contains newline"), "got: {msg}");
    }
}
