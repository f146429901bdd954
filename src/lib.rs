//! Fetcher Core Library
//!
//! Session-aware HTTP access for content retrieval: one persistent session
//! (headers, cookies, retry policy), single-request execution with per-call
//! header overlay, an anti-bot clearance handshake, and a bounded pool for
//! fanning out independent fetches.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`session`] - Session state, lifecycle and merge semantics
//! - [`request`] - Request execution, retries and downloads
//! - [`challenge`] - Anti-bot handshake reconciled into the session
//! - [`fetcher`] - Bounded concurrent job execution
//! - [`config`] - Transport configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod challenge;
pub mod config;
pub mod fetcher;
pub mod request;
pub mod session;
mod user_agent;

// Re-export commonly used types
pub use challenge::{ChallengeError, ChallengeResult, ChallengeSolver, ClearanceHandler};
pub use config::{ConfigError, SessionConfig};
pub use fetcher::{ConcurrentFetcher, DEFAULT_WORKERS, FetchStats, FetcherError};
pub use request::{
    DEFAULT_MAX_RETRIES, FetchError, RequestBody, RequestExecutor, RequestOptions, ResponseView,
};
pub use session::{HeaderStore, SessionError, SessionHandle, SessionManager, SessionState};
