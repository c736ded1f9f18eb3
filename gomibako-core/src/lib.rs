//! Core types for the gomibako request bin.
//!
//! Defines the value types shared by the hub and the HTTP gateway: bin and
//! feed identifiers, captured requests with their header multimap, and the
//! key generation seam.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod id;
pub mod keygen;
pub mod request;

pub use error::CoreError;
pub use id::{BinKey, FeedId, MAX_KEY_LEN};
pub use keygen::{KeyGenerator, KeyPolicy, RandomKeyGenerator};
pub use request::{CapturedRequest, Headers};
