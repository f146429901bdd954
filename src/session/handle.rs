//! Live transport state behind an open session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument};

use super::{SessionCookies, SessionError};
use crate::config::SessionConfig;
use crate::request::SchemeRetryPolicy;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Transport resources of one session: clients, cookie jar and retry policy.
///
/// Cloning is cheap and every clone refers to the same session; shutting one
/// clone down shuts them all down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    config: SessionConfig,
    following: Client,
    direct: Client,
    cookies: Arc<SessionCookies>,
    retry: SchemeRetryPolicy,
    shut_down: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Builds a handle with an empty cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ClientBuild`] if reqwest rejects the configuration.
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        Self::with_cookies(config, Arc::new(SessionCookies::new()))
    }

    /// Builds a handle around an existing cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ClientBuild`] if reqwest rejects the configuration.
    #[instrument(level = "debug", skip(cookies))]
    pub fn with_cookies(
        config: &SessionConfig,
        cookies: Arc<SessionCookies>,
    ) -> Result<Self, SessionError> {
        let following = base_client_builder(config, Arc::clone(&cookies))
            .redirect(Policy::limited(config.max_redirects))
            .build()
            .map_err(SessionError::ClientBuild)?;
        let direct = base_client_builder(config, Arc::clone(&cookies))
            .redirect(Policy::none())
            .build()
            .map_err(SessionError::ClientBuild)?;

        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(id, "session handle created");

        Ok(Self {
            id,
            config: config.clone(),
            following,
            direct,
            cookies,
            retry: SchemeRetryPolicy::uniform(config.max_retries, config.retry_base_delay()),
            shut_down: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replaces the per-scheme retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: SchemeRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Process-unique identity of this handle.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Configuration the clients were built with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Client to use for a call, depending on whether redirects are followed.
    #[must_use]
    pub fn client(&self, allow_redirects: bool) -> &Client {
        if allow_redirects {
            &self.following
        } else {
            &self.direct
        }
    }

    /// The cookie jar shared by both clients.
    #[must_use]
    pub fn cookies(&self) -> &Arc<SessionCookies> {
        &self.cookies
    }

    /// Per-scheme retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &SchemeRetryPolicy {
        &self.retry
    }

    /// Builds a redirect-following client over a private copy of the cookie
    /// jar, for exchanges whose cookies must not land in the session until
    /// they succeed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ClientBuild`] if reqwest rejects the configuration.
    pub fn staging_client(&self) -> Result<(Client, Arc<SessionCookies>), SessionError> {
        let staged = Arc::new(self.cookies.fork());
        let client = base_client_builder(&self.config, Arc::clone(&staged))
            .redirect(Policy::limited(self.config.max_redirects))
            .build()
            .map_err(SessionError::ClientBuild)?;
        Ok((client, staged))
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called on any clone.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Marks the handle unusable. Pooled connections are released when the
    /// last clone is dropped.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            debug!(id = self.id, "session handle shut down");
        }
    }
}

fn base_client_builder(config: &SessionConfig, cookies: Arc<SessionCookies>) -> ClientBuilder {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.read_timeout())
        .gzip(true)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .danger_accept_invalid_certs(!config.verify_tls)
        .cookie_provider(cookies)
}
