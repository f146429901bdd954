//! Anti-bot handshake: trade the session's user-agent for clearance cookies.
//!
//! [`ChallengeSolver::solve`] runs a [`ChallengeHandler`] against a target
//! URL through a [`ChallengeClient`]. The client starts from a copy of the
//! session's cookie jar and headers, so every cookie the handshake collects
//! is visible to later steps of the same handshake without touching the
//! session. Only when the handler returns a [`ChallengeResult`] are its tokens
//! merged into the session jar and its user-agent installed, in one step.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fetcher_core::challenge::ChallengeSolver;
//! use fetcher_core::session::SessionManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(SessionManager::open(Vec::<(String, String)>::new())?);
//! let solver = ChallengeSolver::new(Arc::clone(&session));
//! let result = solver.solve("https://protected.example/", Vec::<(String, String)>::new()).await?;
//! println!("{} tokens", result.tokens.len());
//! # Ok(())
//! # }
//! ```

mod clearance;
mod error;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{info, instrument};
use url::Url;

pub use clearance::{CLEARANCE_COOKIES, ClearanceHandler, DEFAULT_REQUIRED_TOKEN};
pub use error::ChallengeError;

use crate::request::{FetchError, PreparedRequest, RequestOptions, ResponseView, RetryPolicy};
use crate::session::{HeaderStore, SessionCookies, SessionManager};

/// Header name the user-agent is presented under during the handshake.
const CHALLENGE_UA_HEADER: &str = "user-agent";

/// Outcome of a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResult {
    /// Tokens to merge into the session cookies.
    pub tokens: BTreeMap<String, String>,
    /// User-agent the tokens were issued to; `None` keeps the session's.
    pub user_agent: Option<String>,
}

/// What a handler is asked to clear.
#[derive(Debug, Clone)]
pub struct ChallengeRequest {
    /// Target URL.
    pub url: String,
    /// User-agent to present. Seeded from the session.
    pub user_agent: Option<String>,
    /// Caller-supplied extra headers.
    pub headers: Vec<(String, String)>,
}

impl ChallengeRequest {
    /// Request options carrying the extra headers with the user-agent on top.
    #[must_use]
    pub fn options(&self) -> RequestOptions {
        let options = RequestOptions::new().headers(self.headers.iter().cloned());
        match &self.user_agent {
            Some(user_agent) => options.header(CHALLENGE_UA_HEADER, user_agent.clone()),
            None => options,
        }
    }
}

/// Transport handed to a [`ChallengeHandler`].
///
/// Sends with the session's headers and retry policy, but stores cookies in
/// a private jar until the handshake is applied.
#[derive(Debug)]
pub struct ChallengeClient {
    client: Client,
    jar: Arc<SessionCookies>,
    headers: HeaderStore,
    retry: RetryPolicy,
}

impl ChallengeClient {
    /// `GET` through the staging client, following redirects.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for invalid input or transport failure.
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<ResponseView, FetchError> {
        self.execute(Method::GET, url, options).await
    }

    /// Arbitrary exchange through the staging client.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for invalid input or transport failure.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<ResponseView, FetchError> {
        let prepared = PreparedRequest::build(method, url, self.headers.clone(), options)?;
        let response = prepared.send(&self.client, &self.retry).await?;
        ResponseView::from_response(response).await
    }

    /// Cookies held by the staging jar, including those copied from the session.
    #[must_use]
    pub fn cookies(&self) -> BTreeMap<String, String> {
        self.jar.snapshot()
    }
}

/// A strategy for passing an origin's anti-bot check.
#[async_trait]
pub trait ChallengeHandler: Send + Sync {
    /// Performs the handshake and returns the tokens it produced.
    ///
    /// # Errors
    ///
    /// Any error aborts the handshake; nothing is merged into the session.
    async fn get_tokens(
        &self,
        client: &ChallengeClient,
        request: ChallengeRequest,
    ) -> Result<ChallengeResult, ChallengeError>;
}

/// Runs handshakes against one session.
#[derive(Clone)]
pub struct ChallengeSolver {
    session: Arc<SessionManager>,
    handler: Arc<dyn ChallengeHandler>,
}

impl std::fmt::Debug for ChallengeSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeSolver")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ChallengeSolver {
    /// Solver using [`ClearanceHandler`].
    #[must_use]
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self::with_handler(session, Arc::new(ClearanceHandler::new()))
    }

    #[must_use]
    pub fn with_handler(session: Arc<SessionManager>, handler: Arc<dyn ChallengeHandler>) -> Self {
        Self { session, handler }
    }

    /// Clears `url` and reconciles the result into the session.
    ///
    /// `extra_headers` are sent with the handshake only. On success the
    /// returned tokens are merged into the session cookies for the host of
    /// `url` and, if the
    /// handshake used a different user-agent, the session user-agent is
    /// switched to it.
    ///
    /// # Errors
    ///
    /// - [`ChallengeError::Session`] if the session is closed (checked first)
    /// - whatever the handler returns; the session is left untouched
    #[instrument(skip(self, extra_headers), fields(url = %url))]
    pub async fn solve<I, K, V>(
        &self,
        url: &str,
        extra_headers: I,
    ) -> Result<ChallengeResult, ChallengeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (handle, headers) = self.session.request_snapshot()?;
        let (client, jar) = handle.staging_client()?;
        let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
        let retry = handle
            .retry_policy()
            .for_scheme(scheme)
            .cloned()
            .unwrap_or_else(RetryPolicy::disabled);

        let request = ChallengeRequest {
            url: url.to_string(),
            user_agent: headers.get(CHALLENGE_UA_HEADER).map(ToString::to_string),
            headers: extra_headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };
        let client = ChallengeClient {
            client,
            jar,
            headers,
            retry,
        };

        let result = self.handler.get_tokens(&client, request).await?;
        let host = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(ToString::to_string));
        let user_agent_changed = self.session.apply_clearance(
            &result.tokens,
            result.user_agent.as_deref(),
            host.as_deref(),
        )?;
        info!(
            tokens = result.tokens.len(),
            user_agent_changed, "challenge solved"
        );
        Ok(result)
    }
}
