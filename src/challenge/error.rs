//! Error types for the anti-bot handshake.

use thiserror::Error;

use crate::request::FetchError;
use crate::session::SessionError;

/// Reasons a handshake did not complete. No cookies are merged on any of them.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The session was closed before the handshake started.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The challenge exchange failed at the transport or HTTP level.
    #[error("challenge request failed: {0}")]
    Transport(#[from] FetchError),

    /// The origin still served its challenge page.
    #[error("anti-bot challenge at {url} was not solved (HTTP {status})")]
    Unsolved {
        /// Final URL that served the challenge.
        url: String,
        /// Status of the challenge page.
        status: u16,
    },

    /// The exchange succeeded but the expected clearance cookie never arrived.
    #[error("challenge at {url} completed without a {token} cookie")]
    MissingToken {
        /// URL the handshake targeted.
        url: String,
        /// Name of the missing token.
        token: String,
    },
}

impl ChallengeError {
    /// Creates an unsolved-challenge error.
    pub fn unsolved(url: impl Into<String>, status: u16) -> Self {
        Self::Unsolved {
            url: url.into(),
            status,
        }
    }

    /// Creates a missing-token error.
    pub fn missing_token(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::MissingToken {
            url: url.into(),
            token: token.into(),
        }
    }
}
