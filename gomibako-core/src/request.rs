use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::BinKey;

/// Header multimap: each name maps to its values in arrival order.
///
/// Names keep the order in which they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(IndexMap<String, Vec<String>>);

impl Headers {
    /// Creates an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under `name`, keeping earlier values.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    /// Returns all values recorded for `name`, in arrival order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0.get(name).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, values)` in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flattens the multimap into `(name, value)` pairs sorted by name, then value.
    #[must_use]
    pub fn sorted_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .0
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.clone(), v.clone())))
            .collect();
        pairs.sort();
        pairs
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

/// An inbound HTTP request recorded into a bin.
///
/// Immutable once built. The body is already size-bounded by whoever read it
/// off the wire; `Bytes` keeps clones cheap when the same request sits in the
/// history and in several subscriber feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CapturedRequest {
    /// Bin this request was sent to.
    pub key: BinKey,
    /// Arrival time.
    pub received_at: DateTime<Utc>,
    /// HTTP method, e.g. `"POST"`.
    pub method: String,
    /// Request target including the query string.
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
    /// Value of the `Content-Length` header, if the client sent one.
    pub content_length: Option<u64>,
}

impl CapturedRequest {
    /// Starts a request with no headers, an empty body, and `received_at = now`.
    pub fn new(key: BinKey, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key,
            received_at: Utc::now(),
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: Bytes::new(),
            content_length: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_content_length(mut self, content_length: Option<u64>) -> Self {
        self.content_length = content_length;
        self
    }

    /// Overrides the arrival timestamp.
    #[must_use]
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}
