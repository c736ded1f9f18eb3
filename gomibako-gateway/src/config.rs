//! Gateway configuration.

use gomibako_hub::HubConfig;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Largest request body recorded into a bin (3 MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 3_000_000;

/// Settings for the HTTP front end and the hub behind it.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GatewayConfig {
    pub listen_addr: String,
    /// Bodies above this size are rejected with `413`.
    pub max_body_bytes: usize,
    pub hub: HubConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            hub: HubConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// - `GOMIBAKO_LISTEN_ADDR` (default: `0.0.0.0:8000`)
    /// - `GOMIBAKO_MAX_BODY_BYTES` (default: 3000000)
    /// - everything read by [`HubConfig::from_env`]
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup (for testing).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let listen_addr =
            lookup("GOMIBAKO_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let max_body_bytes = match lookup("GOMIBAKO_MAX_BODY_BYTES") {
            None => DEFAULT_MAX_BODY_BYTES,
            Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
                tracing::warn!(
                    value = %raw,
                    error = %e,
                    "ignoring invalid GOMIBAKO_MAX_BODY_BYTES"
                );
                DEFAULT_MAX_BODY_BYTES
            }),
        };
        Self { listen_addr, max_body_bytes, hub: HubConfig::from_lookup(lookup) }
    }

    #[must_use]
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    #[must_use]
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }
}
