//! Cookie-clearance handshake for Cloudflare-fronted origins.
//!
//! The handler fetches the target once through the staging client. A
//! challenge page (403/429/503 from a `cloudflare` server carrying one of the
//! interstitial markers) means the origin wants a browser, and the handshake
//! fails with [`ChallengeError::Unsolved`]. Otherwise the clearance cookies
//! the exchange collected are returned together with the user-agent they were
//! issued to.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::SERVER;
use tracing::{debug, instrument, warn};

use super::{ChallengeClient, ChallengeError, ChallengeHandler, ChallengeRequest, ChallengeResult};
use crate::request::{FetchError, ResponseView};

/// Cookie names issued by the clearance flow.
pub const CLEARANCE_COOKIES: &[&str] = &[
    "cf_clearance",
    "__cf_bm",
    "cf_chl_2",
    "cf_chl_prog",
    "cf_chl_rc_ni",
    "cf_chl_rc_m",
    "__cfduid",
];

/// Token that must be present for the handshake to count as solved.
pub const DEFAULT_REQUIRED_TOKEN: &str = "cf_clearance";

const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "challenge-platform",
    "jschl",
];

/// Default [`ChallengeHandler`].
#[derive(Debug, Clone)]
pub struct ClearanceHandler {
    required_token: Option<String>,
    user_agent: Option<String>,
}

impl Default for ClearanceHandler {
    fn default() -> Self {
        Self {
            required_token: Some(DEFAULT_REQUIRED_TOKEN.to_string()),
            user_agent: None,
        }
    }
}

impl ClearanceHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes the token that must be present. With `None`, any one of
    /// [`CLEARANCE_COOKIES`] is enough.
    #[must_use]
    pub fn with_required_token(mut self, token: Option<&str>) -> Self {
        self.required_token = token.map(ToString::to_string);
        self
    }

    /// Presents `user_agent` instead of the session's. The session is
    /// switched to it once the handshake succeeds.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[async_trait]
impl ChallengeHandler for ClearanceHandler {
    #[instrument(skip(self, client, request), fields(url = %request.url))]
    async fn get_tokens(
        &self,
        client: &ChallengeClient,
        mut request: ChallengeRequest,
    ) -> Result<ChallengeResult, ChallengeError> {
        if let Some(user_agent) = &self.user_agent {
            request.user_agent = Some(user_agent.clone());
        }

        let response = client.get(&request.url, request.options()).await?;
        if is_challenge_page(&response) {
            warn!(status = response.status().as_u16(), "challenge page served");
            return Err(ChallengeError::unsolved(
                response.url().as_str(),
                response.status().as_u16(),
            ));
        }
        if !response.status().is_success() {
            return Err(FetchError::http_status(
                response.url().as_str(),
                response.status().as_u16(),
            )
            .into());
        }

        let jar = client.cookies();
        let tokens: BTreeMap<String, String> = jar
            .into_iter()
            .filter(|(name, _)| CLEARANCE_COOKIES.contains(&name.as_str()))
            .collect();

        match &self.required_token {
            Some(required) if !tokens.contains_key(required) => {
                return Err(ChallengeError::missing_token(&request.url, required));
            }
            None if tokens.is_empty() => {
                return Err(ChallengeError::missing_token(
                    &request.url,
                    "clearance",
                ));
            }
            _ => {}
        }

        debug!(tokens = tokens.len(), "clearance tokens collected");
        Ok(ChallengeResult {
            tokens,
            user_agent: request.user_agent,
        })
    }
}

fn is_challenge_page(response: &ResponseView) -> bool {
    let status = response.status();
    if !matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    ) {
        return false;
    }
    let served_by_cloudflare = response
        .header(SERVER.as_str())
        .is_some_and(|server| server.to_ascii_lowercase().contains("cloudflare"));
    if !served_by_cloudflare {
        return false;
    }
    let body = response.text();
    CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_requires_clearance_cookie() {
        let handler = ClearanceHandler::new();
        assert_eq!(handler.required_token.as_deref(), Some("cf_clearance"));
        assert!(handler.user_agent.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let handler = ClearanceHandler::new()
            .with_required_token(None)
            .with_user_agent("browser/1");
        assert!(handler.required_token.is_none());
        assert_eq!(handler.user_agent.as_deref(), Some("browser/1"));
    }

    #[test]
    fn test_known_token_names() {
        assert!(CLEARANCE_COOKIES.contains(&DEFAULT_REQUIRED_TOKEN));
        assert!(CLEARANCE_COOKIES.contains(&"__cf_bm"));
    }
}
