//! Sync client configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::discovery::DEFAULT_DISCOVERY_TIMEOUT;
use lanvault_common::{Error, Result};

/// Where the sync host lives and how to authenticate to it.
///
/// Persisted outside the vault, in the keystore.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub host_url: Option<String>,
    pub auth_token: Option<String>,
}

impl SyncConfig {
    /// Validate and normalize a host URL and token.
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the URL is not http(s) or the token is empty
    pub fn new(host_url: &str, auth_token: &str) -> Result<Self> {
        if auth_token.is_empty() {
            return Err(Error::InvalidInput("Auth token cannot be empty".to_string()));
        }
        Ok(Self {
            host_url: Some(normalize_host_url(host_url)?),
            auth_token: Some(auth_token.to_string()),
        })
    }

    /// Both URL and token are present.
    pub fn is_complete(&self) -> bool {
        self.host_url.is_some() && self.auth_token.is_some()
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("host_url", &self.host_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Check that `raw` is an http(s) URL and strip any trailing slash.
pub fn normalize_host_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| Error::InvalidInput(format!("Invalid host URL {:?}: {}", trimmed, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidInput(format!(
                "Unsupported host URL scheme: {}",
                other
            )))
        }
    }
    if parsed.host_str().is_none() {
        return Err(Error::InvalidInput("Host URL has no host".to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Transport settings for the sync client.
#[derive(Debug, Clone)]
pub struct SyncClientConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// How long discovery waits for a host.
    pub discovery_timeout: Duration,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_trailing_slash() {
        let config = SyncConfig::new("http://192.168.1.5:3000/", "tok").unwrap();
        assert_eq!(config.host_url.as_deref(), Some("http://192.168.1.5:3000"));
        assert!(config.is_complete());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(SyncConfig::new("192.168.1.5:3000", "tok").is_err());
        assert!(SyncConfig::new("ftp://host", "tok").is_err());
        assert!(SyncConfig::new("http://host:3000", "").is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let config = SyncConfig::new("http://h:1", "very-secret").unwrap();
        assert!(!format!("{:?}", config).contains("very-secret"));
    }

    #[test]
    fn test_default_is_incomplete() {
        assert!(!SyncConfig::default().is_complete());
        assert_eq!(
            SyncClientConfig::default().discovery_timeout,
            Duration::from_millis(5000)
        );
    }
}
