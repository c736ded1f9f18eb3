//! JSON presentation of captured requests.

use base64::Engine as _;
use gomibako_core::{BinKey, CapturedRequest};
use serde::Serialize;

/// One header line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderView {
    pub name: String,
    pub value: String,
}

/// How [`RequestView::body`] is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Utf8,
    Base64,
}

/// A captured request flattened for display.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    /// RFC 3339 arrival time.
    pub timestamp: String,
    pub method: String,
    pub url: String,
    /// Sorted by name, then value.
    pub headers: Vec<HeaderView>,
    pub body: String,
    pub body_encoding: BodyEncoding,
    pub body_len: usize,
    pub content_length: Option<u64>,
}

impl From<&CapturedRequest> for RequestView {
    fn from(request: &CapturedRequest) -> Self {
        let (body, body_encoding) = match std::str::from_utf8(&request.body) {
            Ok(text) => (text.to_owned(), BodyEncoding::Utf8),
            Err(_) => (
                base64::engine::general_purpose::STANDARD.encode(&request.body),
                BodyEncoding::Base64,
            ),
        };
        Self {
            timestamp: request.received_at.to_rfc3339(),
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request
                .headers
                .sorted_pairs()
                .into_iter()
                .map(|(name, value)| HeaderView { name, value })
                .collect(),
            body,
            body_encoding,
            body_len: request.body.len(),
            content_length: request.content_length,
        }
    }
}

/// `GET /g/{key}/inspect` response body.
#[derive(Debug, Clone, Serialize)]
pub struct InspectView {
    pub key: BinKey,
    /// Newest first.
    pub requests: Vec<RequestView>,
}

impl InspectView {
    /// Builds the view from a history snapshot, which is oldest first.
    #[must_use]
    pub fn from_history<R: AsRef<CapturedRequest>>(key: BinKey, history: &[R]) -> Self {
        let requests = history.iter().rev().map(|r| RequestView::from(r.as_ref())).collect();
        Self { key, requests }
    }
}
