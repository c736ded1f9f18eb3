use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Longest key accepted by [`BinKey::parse`].
pub const MAX_KEY_LEN: usize = 64;

/// Opaque identifier of a bin.
///
/// Keys minted by a [`KeyGenerator`](crate::keygen::KeyGenerator) are
/// fixed-length strings over a fixed alphabet. Keys arriving from outside
/// (e.g. an URL path segment) go through [`BinKey::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BinKey(String);

impl BinKey {
    /// Creates a `BinKey` without validation.
    ///
    /// Intended for key generators, which already guarantee the format.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Parses an untrusted key.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidKey`] if the input is empty, longer than
    /// [`MAX_KEY_LEN`], or contains anything but ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() {
            return Err(CoreError::InvalidKey { reason: "key is empty".to_owned() });
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(CoreError::InvalidKey {
                reason: format!("key exceeds {MAX_KEY_LEN} characters"),
            });
        }
        if let Some(c) = raw.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidKey { reason: format!("unexpected character {c:?}") });
        }
        Ok(Self(raw.to_owned()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BinKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for BinKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifies one live subscriber feed on a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub struct FeedId(pub Uuid);

impl FeedId {
    /// Creates a new random `FeedId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeedId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for FeedId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
