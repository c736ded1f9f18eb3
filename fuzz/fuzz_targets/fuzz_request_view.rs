//! Fuzz target: rendering a captured request with an arbitrary body and
//! header value into its JSON view.

#![no_main]

use gomibako_core::{BinKey, CapturedRequest, Headers};
use gomibako_gateway::view::RequestView;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let (head, body) = data.split_at(split);
    let mut headers = Headers::new();
    headers.append("x-fuzz", String::from_utf8_lossy(head));

    let request = CapturedRequest::new(BinKey::new("fuzz"), "POST", "/g/fuzz")
        .with_headers(headers)
        .with_body(body.to_vec());
    let view = RequestView::from(&request);
    assert_eq!(view.body_len, body.len());
    let _ = serde_json::to_string(&view);
});
