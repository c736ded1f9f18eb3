/// Errors produced by the `gomibako-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A key supplied from outside did not match the accepted format.
    #[error("invalid bin key: {reason}")]
    InvalidKey { reason: String },

    /// A key policy cannot produce any key (empty alphabet or zero length).
    #[error("invalid key policy: {reason}")]
    InvalidKeyPolicy { reason: String },

    /// The key generator failed to produce a key. Safe to retry.
    #[error("key generation failed: {reason}")]
    KeyGeneration { reason: String },
}
