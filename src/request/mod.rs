//! Single-exchange request execution against a shared session.
//!
//! [`RequestExecutor`] takes a snapshot of the session's handle and headers
//! for every call, overlays the per-call [`RequestOptions`], sends the request
//! with the session's per-scheme retry policy and buffers the response into a
//! [`ResponseView`]. Per-call options never change session state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fetcher_core::request::{RequestExecutor, RequestOptions};
//! use fetcher_core::session::SessionManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(SessionManager::open([("Referer", "https://example.com/")])?);
//! let executor = RequestExecutor::new(Arc::clone(&session));
//!
//! let page = executor
//!     .get("https://example.com/list", RequestOptions::new().no_referer())
//!     .await?;
//! println!("{} bytes from {}", page.body().len(), page.url());
//!
//! let saved = executor.download("https://example.com/a.jpg", "/tmp".as_ref(), None).await?;
//! println!("saved to {}", saved.display());
//! # Ok(())
//! # }
//! ```

mod error;
mod filename;
mod response;
mod retry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, Method};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use error::FetchError;
pub use filename::filename_from_url;
pub use response::ResponseView;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, SchemeRetryPolicy,
    classify_error,
};

use crate::session::{HeaderStore, SessionError, SessionManager};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Payload of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` pairs. An empty form sends an
    /// empty body without a content type.
    Form(Vec<(String, String)>),
    /// JSON document.
    Json(serde_json::Value),
    /// Raw bytes, sent as-is.
    Bytes(Vec<u8>),
}

/// Per-call settings. None of them persist into the session.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    has_referer: bool,
    allow_redirects: Option<bool>,
    body: Option<RequestBody>,
    query: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            has_referer: true,
            allow_redirects: None,
            body: None,
            query: Vec::new(),
            timeout: None,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header override for this call. Overrides win over session headers.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds several header overrides.
    #[must_use]
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Whether the session `Referer` is sent (default `true`).
    #[must_use]
    pub fn has_referer(mut self, has_referer: bool) -> Self {
        self.has_referer = has_referer;
        self
    }

    /// Drops `Referer` from this call.
    #[must_use]
    pub fn no_referer(self) -> Self {
        self.has_referer(false)
    }

    /// Overrides redirect following (default `true`).
    #[must_use]
    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = Some(allow);
        self
    }

    /// Sends a form-encoded body.
    #[must_use]
    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Some(RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        self
    }

    /// Sends a JSON body.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Sends a raw body.
    #[must_use]
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Timeout for the whole exchange, shortening the session read timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// Everything needed to (re)send one exchange.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) allow_redirects: bool,
}

impl PreparedRequest {
    /// Resolves `options` against a session header snapshot.
    pub(crate) fn build(
        method: Method,
        url: &str,
        session_headers: HeaderStore,
        options: RequestOptions,
    ) -> Result<Self, FetchError> {
        let mut url = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::invalid_url(url.as_str()));
        }
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&options.query);
        }

        let overrides = HeaderStore::from_pairs(
            options
                .headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        )
        .map_err(|e| match e {
            SessionError::InvalidHeader { name, reason } => FetchError::invalid_header(name, reason),
            other => FetchError::Session(other),
        })?;
        let mut headers = session_headers;
        headers.extend(&overrides);
        if !options.has_referer {
            headers.remove(REFERER.as_str());
        }
        let mut headers = headers.into_header_map();

        let body = match options.body {
            Some(RequestBody::Form(fields)) if fields.is_empty() => Some(Vec::new()),
            Some(RequestBody::Form(fields)) => {
                set_default_content_type(&mut headers, FORM_CONTENT_TYPE);
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&fields)
                    .finish();
                Some(encoded.into_bytes())
            }
            Some(RequestBody::Json(value)) => {
                set_default_content_type(&mut headers, JSON_CONTENT_TYPE);
                Some(serde_json::to_vec(&value).map_err(FetchError::InvalidBody)?)
            }
            Some(RequestBody::Bytes(bytes)) => Some(bytes),
            None => None,
        };

        Ok(Self {
            method,
            url,
            headers,
            body,
            timeout: options.timeout,
            allow_redirects: options.allow_redirects.unwrap_or(true),
        })
    }

    /// Sends through `client`, retrying connect failures according to `policy`.
    pub(crate) async fn send(
        &self,
        client: &Client,
        policy: &RetryPolicy,
    ) -> Result<reqwest::Response, FetchError> {
        let mut attempt = 1;
        loop {
            let mut request = client
                .request(self.method.clone(), self.url.clone())
                .headers(self.headers.clone());
            if let Some(body) = &self.body {
                request = request.body(body.clone());
            }
            if let Some(timeout) = self.timeout {
                request = request.timeout(timeout);
            }

            let error = match request.send().await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        url = %self.url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %self.url, attempt, reason = %reason, "giving up");
                    return Err(FetchError::transport(self.url.as_str(), error));
                }
            }
        }
    }
}

fn set_default_content_type(headers: &mut HeaderMap, content_type: &'static str) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
}

/// Executes requests against one shared [`SessionManager`].
///
/// Cloning is cheap; clones share the session.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    session: Arc<SessionManager>,
}

impl RequestExecutor {
    #[must_use]
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// The session requests run against.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Performs one exchange and buffers the full response.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Session`] if the session is closed
    /// - [`FetchError::InvalidUrl`], [`FetchError::InvalidHeader`] or
    ///   [`FetchError::InvalidBody`] for unusable input
    /// - [`FetchError::Network`] or [`FetchError::Timeout`] for transport failures
    ///
    /// Non-success statuses are returned as a normal [`ResponseView`].
    #[instrument(skip(self, options), fields(method = %method, url = %url))]
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<ResponseView, FetchError> {
        let response = self.send(method, url, options).await?;
        let view = ResponseView::from_response(response).await?;
        debug!(
            status = view.status().as_u16(),
            bytes = view.body().len(),
            final_url = %view.url(),
            "request complete"
        );
        Ok(view)
    }

    /// `GET`, following redirects unless disabled in `options`.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<ResponseView, FetchError> {
        self.execute(Method::GET, url, options).await
    }

    /// `POST`, sending an empty form when `options` carries no body.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn post(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ResponseView, FetchError> {
        let options = if options.has_body() {
            options
        } else {
            options.body(RequestBody::Form(Vec::new()))
        };
        self.execute(Method::POST, url, options).await
    }

    /// Downloads `url` into `directory` and returns the absolute path written.
    ///
    /// # Errors
    ///
    /// See [`download_with`](Self::download_with).
    pub async fn download(
        &self,
        url: &str,
        directory: &Path,
        name: Option<&str>,
    ) -> Result<PathBuf, FetchError> {
        self.download_with(url, directory, name, RequestOptions::default())
            .await
    }

    /// Downloads with per-call options.
    ///
    /// The file is named `name` when given, otherwise after the last path
    /// segment of the final (post-redirect) URL.
    ///
    /// # Errors
    ///
    /// - Everything [`execute`](Self::execute) returns
    /// - [`FetchError::HttpStatus`] for a non-success status (no file is created)
    /// - [`FetchError::CantWriteFile`] if the destination cannot be opened
    /// - [`FetchError::Io`] if writing fails; the partial file is removed
    #[instrument(skip(self, directory, options), fields(url = %url))]
    pub async fn download_with(
        &self,
        url: &str,
        directory: &Path,
        name: Option<&str>,
        options: RequestOptions,
    ) -> Result<PathBuf, FetchError> {
        let response = self.send(Method::GET, url, options).await?;
        let final_url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(final_url.as_str(), status.as_u16()));
        }

        let path = filename::destination_path(directory, name, &final_url)
            .map_err(|e| FetchError::cant_write_file(directory.join(name.unwrap_or_default()), e))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| FetchError::cant_write_file(&path, e))?;

        let written = stream_to_file(&mut file, response, final_url.as_str(), &path).await;
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %path.display(), "removing partial file after error");
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "partial file left behind"
                    );
                }
                return Err(error);
            }
        };

        let path = std::path::absolute(&path).unwrap_or(path);
        info!(path = %path.display(), bytes, "download complete");
        Ok(path)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<reqwest::Response, FetchError> {
        let (handle, headers) = self.session.request_snapshot()?;
        let prepared = PreparedRequest::build(method, url, headers, options)?;
        let policy = handle
            .retry_policy()
            .for_scheme(prepared.url.scheme())
            .cloned()
            .unwrap_or_else(RetryPolicy::disabled);
        prepared
            .send(handle.client(prepared.allow_redirects), &policy)
            .await
    }
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::transport(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::io(file_path, e))?;

    Ok(bytes_written)
}
