//! Wire-level request representation.

use crate::request::HttpMethod;
use serde::{Deserialize, Serialize};
use url::Url;

/// Ordered header map with case-insensitive keys
///
/// Inserting a key that already exists (ignoring ASCII case) replaces the
/// earlier value in place: last write wins, first position is kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// An empty map
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace a header, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&key))
        {
            Some(entry) => {
                let previous = std::mem::replace(&mut entry.1, value);
                entry.0 = key;
                Some(previous)
            },
            None => {
                self.entries.push((key, value));
                None
            },
        }
    }

    /// Look up a header value, ignoring key case
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Whether a header is present, ignoring key case
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of distinct headers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// A fully resolved request, ready for the transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Absolute URL including the encoded query string
    pub url: Url,
    /// HTTP method
    pub method: HttpMethod,
    /// Deduplicated headers; includes `Content-Type` when the body has one
    pub headers: HeaderMap,
    /// Encoded body bytes (empty for no body)
    pub body: Vec<u8>,
    /// Content type of `body`, if known
    pub content_type: Option<String>,
}
