//! Bin key generation.

use rand::seq::IndexedRandom;

use crate::error::CoreError;
use crate::id::BinKey;

/// Lowercase letters and digits, the default key alphabet.
pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Default key length.
pub const DEFAULT_KEY_LEN: usize = 10;

/// Shape of generated keys: `length` characters drawn from `alphabet`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct KeyPolicy {
    pub alphabet: Vec<char>,
    pub length: usize,
}

impl KeyPolicy {
    /// Builds a policy.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidKeyPolicy`] if the alphabet is empty, the
    /// length is zero or exceeds [`MAX_KEY_LEN`](crate::id::MAX_KEY_LEN), or
    /// the alphabet holds characters [`BinKey::parse`] would reject.
    pub fn new(alphabet: &str, length: usize) -> Result<Self, CoreError> {
        if alphabet.is_empty() {
            return Err(CoreError::InvalidKeyPolicy { reason: "alphabet is empty".to_owned() });
        }
        if length == 0 || length > crate::id::MAX_KEY_LEN {
            return Err(CoreError::InvalidKeyPolicy {
                reason: format!("length {length} out of range 1..={}", crate::id::MAX_KEY_LEN),
            });
        }
        if let Some(c) = alphabet.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidKeyPolicy {
                reason: format!("alphabet contains non-alphanumeric {c:?}"),
            });
        }
        let mut chars: Vec<char> = alphabet.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        Ok(Self { alphabet: chars, length })
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self { alphabet: DEFAULT_ALPHABET.chars().collect(), length: DEFAULT_KEY_LEN }
    }
}

/// Source of fresh bin keys.
///
/// Implementations must be `Send + Sync`; the registry calls them from many
/// tasks. Uniqueness is best effort, callers check for collisions.
pub trait KeyGenerator: Send + Sync {
    /// Produces a new key.
    ///
    /// # Errors
    /// Returns [`CoreError::KeyGeneration`] on a transient failure.
    fn generate(&self) -> Result<BinKey, CoreError>;
}

/// Draws keys uniformly from a [`KeyPolicy`] using the thread-local RNG.
#[derive(Debug, Clone, Default)]
pub struct RandomKeyGenerator {
    policy: KeyPolicy,
}

impl RandomKeyGenerator {
    #[must_use]
    pub fn new(policy: KeyPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }
}

impl KeyGenerator for RandomKeyGenerator {
    fn generate(&self) -> Result<BinKey, CoreError> {
        let mut rng = rand::rng();
        let mut key = String::with_capacity(self.policy.length);
        for _ in 0..self.policy.length {
            let c = self.policy.alphabet.choose(&mut rng).ok_or_else(|| {
                CoreError::KeyGeneration { reason: "key alphabet is empty".to_owned() }
            })?;
            key.push(*c);
        }
        Ok(BinKey::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_generator_matches_policy() {
        let generator = RandomKeyGenerator::default();
        let key = match generator.generate() {
            Ok(k) => k,
            Err(e) => panic!("generation failed: {e}"),
        };
        assert_eq!(key.as_str().len(), DEFAULT_KEY_LEN);
        assert!(
            key.as_str().chars().all(|c| DEFAULT_ALPHABET.contains(c)),
            "key {key} has characters outside the alphabet"
        );
    }

    #[test]
    fn generated_keys_round_trip_through_parse() {
        let generator = RandomKeyGenerator::default();
        for _ in 0..32 {
            let key = match generator.generate() {
                Ok(k) => k,
                Err(e) => panic!("generation failed: {e}"),
            };
            assert!(BinKey::parse(key.as_str()).is_ok(), "{key} must parse");
        }
    }

    #[test]
    fn single_letter_alphabet_is_deterministic() {
        let policy = match KeyPolicy::new("z", 4) {
            Ok(p) => p,
            Err(e) => panic!("policy rejected: {e}"),
        };
        let generator = RandomKeyGenerator::new(policy);
        let key = match generator.generate() {
            Ok(k) => k,
            Err(e) => panic!("generation failed: {e}"),
        };
        assert_eq!(key.as_str(), "zzzz");
    }

    #[test]
    fn policy_rejects_degenerate_shapes() {
        assert!(KeyPolicy::new("", 10).is_err(), "empty alphabet");
        assert!(KeyPolicy::new("abc", 0).is_err(), "zero length");
        assert!(KeyPolicy::new("abc", 65).is_err(), "too long");
        assert!(KeyPolicy::new("ab-", 4).is_err(), "unparseable character");
    }

    #[test]
    fn policy_dedups_alphabet() {
        let policy = match KeyPolicy::new("aabbc", 3) {
            Ok(p) => p,
            Err(e) => panic!("policy rejected: {e}"),
        };
        assert_eq!(policy.alphabet, vec!['a', 'b', 'c']);
    }

    proptest::proptest! {
        #[test]
        fn proptest_policy_keys_always_parse(
            alphabet in "[a-zA-Z0-9]{1,40}",
            length in 1usize..=crate::id::MAX_KEY_LEN,
        ) {
            let policy = match KeyPolicy::new(&alphabet, length) {
                Ok(p) => p,
                Err(e) => panic!("valid policy rejected: {e}"),
            };
            let key = match RandomKeyGenerator::new(policy).generate() {
                Ok(k) => k,
                Err(e) => panic!("generation failed: {e}"),
            };
            proptest::prop_assert_eq!(key.as_str().len(), length);
            proptest::prop_assert!(key.as_str().chars().all(|c| alphabet.contains(c)));
            proptest::prop_assert!(BinKey::parse(key.as_str()).is_ok());
        }
    }
}
