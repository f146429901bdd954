//! Session state: headers, cookies, retry policy and the open/closed lifecycle.
//!
//! A [`SessionManager`] owns exactly one [`SessionHandle`] while open. Every
//! accessor checks the lifecycle first and fails with [`SessionError::Closed`]
//! once the session has been closed. All header/cookie mutation and snapshot
//! reads go through one mutex, so a manager can be shared between concurrent
//! workers behind an `Arc`.
//!
//! # Example
//!
//! ```no_run
//! use fetcher_core::session::SessionManager;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SessionManager::open([("Referer", "https://example.com/")])?;
//! session.update_headers([("accept-language", "en")])?;
//! session.update_cookies([("consent", "1")])?;
//! assert_eq!(session.headers()?.get("REFERER"), Some("https://example.com/"));
//! session.close(true);
//! assert!(session.headers().is_err());
//! # Ok(())
//! # }
//! ```

mod cookies;
mod error;
mod handle;
mod headers;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::header::USER_AGENT;
use tracing::{debug, info, instrument};

pub use cookies::SessionCookies;
pub(crate) use cookies::parse_set_cookie;
pub use error::SessionError;
pub use handle::SessionHandle;
pub use headers::HeaderStore;

use crate::config::SessionConfig;
use crate::request::SchemeRetryPolicy;

/// Observable lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Requests and accessors are allowed.
    Open,
    /// Every operation fails with [`SessionError::Closed`].
    Closed,
}

#[derive(Debug)]
enum Lifecycle {
    Open(SessionHandle),
    Closed,
}

#[derive(Debug)]
struct Inner {
    lifecycle: Lifecycle,
    /// `None` once discarded by `close(true)`.
    headers: Option<HeaderStore>,
}

impl Inner {
    fn open_parts(&mut self) -> Result<(&SessionHandle, &mut HeaderStore), SessionError> {
        let Lifecycle::Open(handle) = &self.lifecycle else {
            return Err(SessionError::Closed);
        };
        let headers = self.headers.get_or_insert_with(HeaderStore::default_seed);
        Ok((handle, headers))
    }
}

/// Owner of one logical HTTP session.
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    inner: Mutex<Inner>,
}

impl SessionManager {
    /// Opens a session with default configuration.
    ///
    /// The header seed is the default header set overlaid with
    /// `initial_headers`; caller values win on conflict.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidHeader`] for an unusable header, or
    /// [`SessionError::ClientBuild`] if the transport cannot be built.
    pub fn open<I, K, V>(initial_headers: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::open_with_config(initial_headers, SessionConfig::default())
    }

    /// Opens a session with explicit transport configuration.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    #[instrument(level = "debug", skip(initial_headers))]
    pub fn open_with_config<I, K, V>(
        initial_headers: I,
        config: SessionConfig,
    ) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderStore::default_seed();
        headers.update(initial_headers)?;
        let handle = SessionHandle::new(&config)?;
        info!(session_id = handle.id(), headers = headers.len(), "session opened");

        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Open(handle),
                headers: Some(headers),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration new handles are built with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.lock().lifecycle {
            Lifecycle::Open(_) => SessionState::Open,
            Lifecycle::Closed => SessionState::Closed,
        }
    }

    /// Returns true while the session accepts operations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Fails with [`SessionError::Closed`] unless the session is open.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`close`](Self::close).
    pub fn ensure_open(&self) -> Result<(), SessionError> {
        match self.lock().lifecycle {
            Lifecycle::Open(_) => Ok(()),
            Lifecycle::Closed => Err(SessionError::Closed),
        }
    }

    /// Closes the session and releases its transport.
    ///
    /// With `delete_headers` the stored headers are discarded as well.
    /// Cookies stay in the jar but cannot be reached until a new handle is
    /// installed. Closing an already closed session only applies
    /// `delete_headers`.
    pub fn close(&self, delete_headers: bool) {
        let mut inner = self.lock();
        if let Lifecycle::Open(handle) = std::mem::replace(&mut inner.lifecycle, Lifecycle::Closed)
        {
            handle.shutdown();
            info!(session_id = handle.id(), delete_headers, "session closed");
        }
        if delete_headers {
            inner.headers = None;
        }
    }

    /// Installs `handle` as the live session, reopening a closed manager.
    ///
    /// The current handle is shut down first; stored headers are kept and
    /// apply to requests made through the new handle. If they had been
    /// discarded, the default header set is used.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidHandle`] if `handle` was already shut
    /// down. The current session is closed (headers kept) even then.
    #[instrument(level = "debug", skip(self, handle), fields(new_id = handle.id()))]
    pub fn replace_session(&self, handle: SessionHandle) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if let Lifecycle::Open(current) =
            std::mem::replace(&mut inner.lifecycle, Lifecycle::Closed)
        {
            current.shutdown();
            debug!(session_id = current.id(), "previous session handle closed");
        }

        if handle.is_shut_down() {
            return Err(SessionError::InvalidHandle {
                id: handle.id(),
                reason: "handle was shut down",
            });
        }

        if inner.headers.is_none() {
            inner.headers = Some(HeaderStore::default_seed());
        }
        info!(session_id = handle.id(), "session handle installed");
        inner.lifecycle = Lifecycle::Open(handle);
        Ok(())
    }

    /// Returns a clone of the live handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn handle(&self) -> Result<SessionHandle, SessionError> {
        match &self.lock().lifecycle {
            Lifecycle::Open(handle) => Ok(handle.clone()),
            Lifecycle::Closed => Err(SessionError::Closed),
        }
    }

    /// Identity of the live handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn session_id(&self) -> Result<u64, SessionError> {
        self.handle().map(|handle| handle.id())
    }

    /// Per-scheme retry policy of the live handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn retry_policy(&self) -> Result<SchemeRetryPolicy, SessionError> {
        self.handle().map(|handle| handle.retry_policy().clone())
    }

    /// Snapshot of the session headers.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn headers(&self) -> Result<HeaderStore, SessionError> {
        let mut inner = self.lock();
        let (_, headers) = inner.open_parts()?;
        Ok(headers.clone())
    }

    /// Replaces the entire header set.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed, or
    /// [`SessionError::InvalidHeader`] for an unusable entry.
    pub fn set_headers<I, K, V>(&self, headers: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let replacement = HeaderStore::from_pairs(headers)?;
        let mut inner = self.lock();
        let (_, current) = inner.open_parts()?;
        *current = replacement;
        Ok(())
    }

    /// Merges entries into the session headers, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed, or
    /// [`SessionError::InvalidHeader`] for an unusable entry (nothing is applied).
    pub fn update_headers<I, K, V>(&self, headers: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut inner = self.lock();
        let (_, current) = inner.open_parts()?;
        current.update(headers)
    }

    /// Removes a session header, returning its previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn remove_header(&self, name: &str) -> Result<Option<String>, SessionError> {
        let mut inner = self.lock();
        let (_, current) = inner.open_parts()?;
        Ok(current.remove(name))
    }

    /// Snapshot of the session cookies.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn cookies(&self) -> Result<BTreeMap<String, String>, SessionError> {
        let mut inner = self.lock();
        let (handle, _) = inner.open_parts()?;
        Ok(handle.cookies().snapshot())
    }

    /// Adds cookies to the session. Existing cookies not named are kept.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn set_cookies<I, K, V>(&self, cookies: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.update_cookies(cookies)
    }

    /// Merges cookies into the session jar.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn update_cookies<I, K, V>(&self, cookies: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut inner = self.lock();
        let (handle, _) = inner.open_parts()?;
        handle.cookies().merge(cookies);
        Ok(())
    }

    /// The session `User-Agent`, if set.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed.
    pub fn user_agent(&self) -> Result<Option<String>, SessionError> {
        let mut inner = self.lock();
        let (_, headers) = inner.open_parts()?;
        Ok(headers.get(USER_AGENT.as_str()).map(ToString::to_string))
    }

    /// Sets the session `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when closed, or
    /// [`SessionError::InvalidHeader`] for an unusable value.
    pub fn set_user_agent(&self, user_agent: &str) -> Result<(), SessionError> {
        let mut inner = self.lock();
        let (_, headers) = inner.open_parts()?;
        headers.insert(USER_AGENT.as_str(), user_agent)
    }

    /// Handle and header snapshot for one outgoing request, taken under a
    /// single lock so both reflect the same moment.
    pub(crate) fn request_snapshot(&self) -> Result<(SessionHandle, HeaderStore), SessionError> {
        let mut inner = self.lock();
        let (handle, headers) = inner.open_parts()?;
        Ok((handle.clone(), headers.clone()))
    }

    /// Applies a completed handshake: merges `tokens` (scoped to `host` when
    /// given) and switches the user-agent if it differs. Validation happens
    /// before any change, so either both updates land or neither does.
    pub(crate) fn apply_clearance(
        &self,
        tokens: &BTreeMap<String, String>,
        user_agent: Option<&str>,
        host: Option<&str>,
    ) -> Result<bool, SessionError> {
        let mut inner = self.lock();
        let (handle, headers) = inner.open_parts()?;

        let switch_to = user_agent.filter(|ua| headers.get(USER_AGENT.as_str()) != Some(*ua));
        if let Some(user_agent) = switch_to {
            headers.insert(USER_AGENT.as_str(), user_agent)?;
        }

        let tokens = tokens.iter().map(|(name, value)| (name.clone(), value.clone()));
        match host {
            Some(host) => handle.cookies().merge_for_host(host, tokens),
            None => handle.cookies().merge(tokens),
        }
        Ok(switch_to.is_some())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Lifecycle::Open(handle) = &self.lock().lifecycle {
            handle.shutdown();
        }
    }
}
