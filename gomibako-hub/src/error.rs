//! Error types for the hub crate.

use gomibako_core::{BinKey, CoreError};

/// Errors returned by registry operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HubError {
    /// No live bin is registered under the key.
    #[error("bin not found: {0}")]
    NotFound(BinKey),

    /// A fresh key could not be minted. Safe to retry.
    #[error("key generation failed: {0}")]
    KeyGeneration(#[source] CoreError),

    /// Every attempt produced a key that was already taken.
    #[error("no unused key after {attempts} attempts")]
    KeyExhausted { attempts: u32 },
}

impl HubError {
    /// Whether the caller may retry the failed operation unchanged.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::KeyGeneration(_) | Self::KeyExhausted { .. })
    }
}
