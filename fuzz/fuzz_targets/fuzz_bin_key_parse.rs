//! Fuzz target: `BinKey::parse` on arbitrary path segments.
//!
//! Any accepted key must be non-empty ASCII alphanumeric and round-trip
//! through `Display`.

#![no_main]

use gomibako_core::{BinKey, MAX_KEY_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else { return };
    if let Ok(key) = BinKey::parse(raw) {
        assert!(!key.as_str().is_empty());
        assert!(key.as_str().len() <= MAX_KEY_LEN);
        assert!(key.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_eq!(key.to_string(), raw);
    }
});
