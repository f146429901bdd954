//! Case-insensitive header storage.
//!
//! [`HeaderStore`] wraps a [`HeaderMap`], so two names differing only in case
//! always address the same entry. Each name holds a single value: inserting
//! replaces, [`update`](HeaderStore::update) merges.

use std::collections::BTreeMap;

use reqwest::header::{ACCEPT, CONNECTION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};

use super::SessionError;
use crate::user_agent;

/// Case-insensitive mapping of header name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderStore {
    map: HeaderMap,
}

impl HeaderStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers every new session starts with before caller overrides.
    #[must_use]
    pub fn default_seed() -> Self {
        let mut map = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&user_agent::default_session_user_agent()) {
            map.insert(USER_AGENT, value);
        }
        map.insert(ACCEPT, HeaderValue::from_static("*/*"));
        map.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        Self { map }
    }

    /// Builds a store from name/value pairs. Later pairs win on name clashes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidHeader`] if any pair is not a valid header.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut store = Self::new();
        store.update(pairs)?;
        Ok(store)
    }

    /// Returns the value stored under `name`, ignoring case.
    ///
    /// Values that are not valid UTF-8 are reported as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.map.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns true when a header named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        HeaderName::from_bytes(name.as_bytes()).is_ok_and(|name| self.map.contains_key(name))
    }

    /// Sets `name` to `value`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidHeader`] if the name or value is invalid.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        let (name, value) = parse_pair(name, value)?;
        self.map.insert(name, value);
        Ok(())
    }

    /// Removes `name`, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.map
            .remove(name)
            .and_then(|value| value.to_str().ok().map(ToString::to_string))
    }

    /// Merges `entries` into the store, leaving unmentioned headers untouched.
    ///
    /// All entries are validated before any is applied, so a failed update
    /// leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidHeader`] on the first invalid entry.
    pub fn update<I, K, V>(&mut self, entries: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let parsed = entries
            .into_iter()
            .map(|(name, value)| parse_pair(name.as_ref(), value.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        for (name, value) in parsed {
            self.map.insert(name, value);
        }
        Ok(())
    }

    /// Merges another store into this one.
    pub fn extend(&mut self, other: &HeaderStore) {
        for (name, value) in &other.map {
            self.map.insert(name.clone(), value.clone());
        }
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.keys_len()
    }

    /// Returns true when no headers are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sorted copy of the headers with lower-cased names.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.map
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect()
    }

    /// Borrows the underlying map for handing to the transport.
    #[must_use]
    pub fn as_header_map(&self) -> &HeaderMap {
        &self.map
    }

    /// Consumes the store, yielding the underlying map.
    #[must_use]
    pub fn into_header_map(self) -> HeaderMap {
        self.map
    }
}

impl From<HeaderMap> for HeaderStore {
    fn from(map: HeaderMap) -> Self {
        Self { map }
    }
}

fn parse_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), SessionError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| SessionError::invalid_header(name, e))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|e| SessionError::invalid_header(name, e))?;
    Ok((header_name, header_value))
}
