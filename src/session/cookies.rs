//! Session cookie jar shared between the session and the transport.
//!
//! Cookies set by a response are scoped to the host that sent them, or to
//! the `Domain` attribute when the host lies inside that domain. They are
//! only attached to requests for a matching host. Cookies merged by the
//! caller carry no scope and go with every request. Reading the jar yields a
//! flat name → value mapping where a scoped cookie shadows an unscoped one
//! of the same name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use tracing::trace;
use url::Url;

/// Hosts a stored cookie is sent to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Scope {
    /// Merged by the caller; sent everywhere.
    Any,
    /// Set without `Domain`; sent to this exact host.
    Host(String),
    /// Set with `Domain`; sent to the domain and its subdomains.
    Domain(String),
}

impl Scope {
    fn matches(&self, host: &str) -> bool {
        match self {
            Scope::Any => true,
            Scope::Host(scope) => scope == host,
            Scope::Domain(domain) => domain_matches(host, domain),
        }
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn request_host(url: &Url) -> Option<String> {
    url.host_str().map(str::to_ascii_lowercase)
}

type Entries = BTreeMap<(Scope, String), String>;

/// Merge-only cookie jar.
#[derive(Default)]
pub struct SessionCookies {
    entries: RwLock<Entries>,
}

impl SessionCookies {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an independent jar holding a copy of this jar's cookies.
    #[must_use]
    pub fn fork(&self) -> Self {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of all cookies, flattened to name → value.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        flatten(entries.iter())
    }

    /// Returns a single cookie value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.snapshot().remove(name)
    }

    /// Adds or overwrites the given cookies for every host, keeping all others.
    pub fn merge<I, K, V>(&self, cookies: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.merge_scoped(&Scope::Any, cookies);
    }

    /// Adds or overwrites cookies sent only to `host`.
    pub fn merge_for_host<I, K, V>(&self, host: &str, cookies: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.merge_scoped(&Scope::Host(host.to_ascii_lowercase()), cookies);
    }

    fn merge_scoped<I, K, V>(&self, scope: &Scope, cookies: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in cookies {
            entries.insert((scope.clone(), name.into()), value.into());
        }
    }

    /// Cookies that would be attached to a request for `url`.
    #[must_use]
    pub fn for_url(&self, url: &Url) -> BTreeMap<String, String> {
        let Some(host) = request_host(url) else {
            return BTreeMap::new();
        };
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        flatten(entries.iter().filter(|((scope, _), _)| scope.matches(&host)))
    }

    /// Number of distinct cookie names held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns true when the jar is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

// Entries are ordered Any < Host < Domain, so scoped values win.
fn flatten<'a>(
    entries: impl Iterator<Item = (&'a (Scope, String), &'a String)>,
) -> BTreeMap<String, String> {
    entries
        .map(|((_, name), value)| (name.clone(), value.clone()))
        .collect()
}

// Values stay out of Debug output.
impl fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.snapshot().into_keys().collect();
        f.debug_struct("SessionCookies")
            .field("names", &names)
            .finish()
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = request_host(url) else {
            return;
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for header in cookie_headers {
            let Some(cookie) = header.to_str().ok().and_then(parse_set_cookie) else {
                continue;
            };
            let scope = match cookie.domain {
                Some(domain) if domain_matches(&host, &domain) => Scope::Domain(domain),
                Some(domain) => {
                    trace!(name = %cookie.name, %host, %domain, "cookie for foreign domain ignored");
                    continue;
                }
                None => Scope::Host(host.clone()),
            };
            trace!(name = %cookie.name, %host, expired = cookie.expired, "cookie received");
            if cookie.expired {
                entries.retain(|(stored, name), _| !(name == &cookie.name && stored.matches(&host)));
            } else {
                entries.insert((scope, cookie.name), cookie.value);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let matching = self.for_url(url);
        if matching.is_empty() {
            return None;
        }
        let joined = matching
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }
}

/// Name and value carried by a single `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SetCookie {
    pub(crate) name: String,
    pub(crate) value: String,
    /// `Domain` attribute, lower-cased and without a leading dot.
    pub(crate) domain: Option<String>,
    /// `Max-Age` of zero or less asks the client to drop the cookie.
    pub(crate) expired: bool,
}

/// Parses `name=value; Attr=...` into its name, value, domain and expiry flag.
pub(crate) fn parse_set_cookie(raw: &str) -> Option<SetCookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let mut domain = None;
    let mut expired = false;
    for attribute in parts {
        let Some((key, attr_value)) = attribute.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let attr_value = attr_value.trim();
        if key.eq_ignore_ascii_case("max-age") {
            expired = attr_value.parse::<i64>().is_ok_and(|age| age <= 0);
        } else if key.eq_ignore_ascii_case("domain") {
            let trimmed = attr_value.trim_start_matches('.').to_ascii_lowercase();
            domain = (!trimmed.is_empty()).then_some(trimmed);
        }
    }

    Some(SetCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain,
        expired,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn test_merge_keeps_previous_cookies() {
        let jar = SessionCookies::new();
        jar.merge([("a", "1")]);
        jar.merge([("b", "2")]);
        let snapshot = jar.snapshot();
        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
        assert_eq!(snapshot.get("b").map(String::as_str), Some("2"));
        assert_eq!(jar.len(), 2);
    }

    #[test]
    fn test_merge_overwrites_same_name() {
        let jar = SessionCookies::new();
        jar.merge([("a", "1")]);
        jar.merge([("a", "2")]);
        assert_eq!(jar.get("a").as_deref(), Some("2"));
        assert_eq!(jar.len(), 1);
    }

    #[test]
    fn test_set_cookies_from_response_headers() {
        let jar = SessionCookies::new();
        let headers = [
            HeaderValue::from_static("session=xyz; Path=/; HttpOnly"),
            HeaderValue::from_static("theme=\"dark\""),
        ];
        jar.set_cookies(&mut headers.iter(), &url());
        assert_eq!(jar.get("session").as_deref(), Some("xyz"));
        assert_eq!(jar.get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn test_set_cookies_max_age_zero_removes() {
        let jar = SessionCookies::new();
        jar.merge([("session", "xyz"), ("keep", "1")]);
        let headers = [HeaderValue::from_static("session=; Max-Age=0")];
        jar.set_cookies(&mut headers.iter(), &url());
        assert_eq!(jar.get("session"), None);
        assert_eq!(jar.get("keep").as_deref(), Some("1"));
    }

    #[test]
    fn test_cookies_header_joins_entries() {
        let jar = SessionCookies::new();
        assert!(jar.cookies(&url()).is_none());
        jar.merge([("b", "2"), ("a", "1")]);
        let header = jar.cookies(&url()).unwrap();
        assert_eq!(header.to_str().unwrap(), "a=1; b=2");
    }

    #[test]
    fn test_fork_is_independent() {
        let jar = SessionCookies::new();
        jar.merge([("a", "1")]);
        let staged = jar.fork();
        staged.merge([("b", "2")]);
        assert_eq!(jar.get("b"), None);
        assert_eq!(staged.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_debug_redacts_values() {
        let jar = SessionCookies::new();
        jar.merge([("token", "secret-value")]);
        let debug = format!("{jar:?}");
        assert!(debug.contains("token"));
        assert!(!debug.contains("secret-value"));
    }

    #[test]
    fn test_response_cookie_stays_with_its_host() {
        let jar = SessionCookies::new();
        jar.merge([("pre", "1")]);
        let headers = [HeaderValue::from_static("sid=secret; Path=/")];
        jar.set_cookies(&mut headers.iter(), &Url::parse("http://127.0.0.1:8080/login").unwrap());

        let same = jar.cookies(&Url::parse("http://127.0.0.1:9090/x").unwrap()).unwrap();
        assert_eq!(same.to_str().unwrap(), "pre=1; sid=secret");
        let other = jar.cookies(&Url::parse("http://localhost:9090/x").unwrap()).unwrap();
        assert_eq!(other.to_str().unwrap(), "pre=1");
        assert_eq!(jar.get("sid").as_deref(), Some("secret"));
    }

    #[test]
    fn test_same_name_from_two_hosts_kept_apart() {
        let jar = SessionCookies::new();
        let a = Url::parse("https://a.example/").unwrap();
        let b = Url::parse("https://b.example/").unwrap();
        jar.set_cookies(&mut [HeaderValue::from_static("sid=aaa")].iter(), &a);
        jar.set_cookies(&mut [HeaderValue::from_static("sid=bbb")].iter(), &b);

        assert_eq!(jar.for_url(&a).get("sid").map(String::as_str), Some("aaa"));
        assert_eq!(jar.for_url(&b).get("sid").map(String::as_str), Some("bbb"));
    }

    #[test]
    fn test_domain_attribute_covers_subdomains() {
        let jar = SessionCookies::new();
        let headers = [
            HeaderValue::from_static("cf_clearance=tok; Domain=.example.com"),
            HeaderValue::from_static("stolen=1; Domain=other.org"),
        ];
        jar.set_cookies(&mut headers.iter(), &Url::parse("https://www.example.com/").unwrap());

        let cdn = jar.for_url(&Url::parse("https://cdn.example.com/").unwrap());
        assert_eq!(cdn.get("cf_clearance").map(String::as_str), Some("tok"));
        assert!(jar.for_url(&Url::parse("https://badexample.com/").unwrap()).is_empty());
        assert_eq!(jar.get("stolen"), None);
    }

    #[test]
    fn test_host_scoped_merge() {
        let jar = SessionCookies::new();
        jar.merge_for_host("Site.Example", [("cf_clearance", "tok")]);
        assert_eq!(
            jar.for_url(&Url::parse("https://site.example/a").unwrap()).len(),
            1
        );
        assert!(jar.for_url(&Url::parse("https://cdn.example/").unwrap()).is_empty());
    }

    #[test]
    fn test_parse_set_cookie_rejects_garbage() {
        assert_eq!(parse_set_cookie("no-equals-sign"), None);
        assert_eq!(parse_set_cookie("=value"), None);
        let parsed = parse_set_cookie("cf_clearance=tok; Max-Age=3600; Secure").unwrap();
        assert_eq!(parsed.name, "cf_clearance");
        assert_eq!(parsed.value, "tok");
        assert_eq!(parsed.domain, None);
        assert!(!parsed.expired);
        let scoped = parse_set_cookie("a=b; domain=.Example.COM").unwrap();
        assert_eq!(scoped.domain.as_deref(), Some("example.com"));
    }
}
