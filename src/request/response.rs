//! Fully buffered view of a completed exchange.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::de::DeserializeOwned;
use url::Url;

use super::FetchError;
use crate::session::parse_set_cookie;

/// Status, headers, cookies, body and final URL of one exchange.
///
/// The body is read to completion before the view is built, so no connection
/// outlives the call that produced it.
#[derive(Debug, Clone)]
pub struct ResponseView {
    status: StatusCode,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    body: Vec<u8>,
    url: Url,
}

impl ResponseView {
    /// Consumes `response`, reading the whole body.
    pub(crate) async fn from_response(response: reqwest::Response) -> Result<Self, FetchError> {
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let cookies = response_cookies(&headers);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url.as_str(), e))?
            .to_vec();

        Ok(Self {
            status,
            headers,
            cookies,
            body,
            url,
        })
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Single response header as text, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Cookies set by this response only (not the whole session jar).
    #[must_use]
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Final URL after redirects.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

fn response_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(parse_set_cookie)
        .filter(|cookie| !cookie.expired)
        .map(|cookie| (cookie.name, cookie.value))
        .collect()
}
