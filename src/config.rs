//! Runtime configuration values.
//!
//! Binaries read the environment (through `clap`) and hand the resulting
//! values to the library; nothing in here touches `std::env`.

use std::fmt;

/// Port the proxy listens on when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 3030;

/// Where the panel client finds the proxy when no URL is given.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3030";

/// Immutable proxy settings, fixed at startup.
#[derive(Clone, Default)]
pub struct ProxyConfig {
    api_key: Option<String>,
}

impl ProxyConfig {
    /// Builds the config from a raw credential as it appears in the
    /// environment. See [`clean_api_key`].
    pub fn new(raw_api_key: Option<&str>) -> Self {
        Self {
            api_key: raw_api_key.and_then(clean_api_key),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| format!("<{} chars>", k.len())),
            )
            .finish()
    }
}

/// Normalizes a credential copied from a `.env` file or shell export.
///
/// Surrounding whitespace and a single leading and trailing quote (`"` or
/// `'`) are removed. An empty result means no credential.
///
/// ```
/// use multilab::config::clean_api_key;
///
/// assert_eq!(clean_api_key("  \"sk-or-v1-abc\"\n").as_deref(), Some("sk-or-v1-abc"));
/// assert_eq!(clean_api_key("''"), None);
/// ```
pub fn clean_api_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    let key = key.strip_prefix(['"', '\'']).unwrap_or(key);
    let key = key.strip_suffix(['"', '\'']).unwrap_or(key);
    let key = key.trim();
    (!key.is_empty()).then(|| key.to_owned())
}
