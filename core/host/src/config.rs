//! Host configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use lanvault_common::{Error, Result};

/// Token used when none is configured. The host warns at start-up.
pub const DEFAULT_TOKEN: &str = "change-me-in-production";

pub const DEFAULT_PORT: u16 = 3000;

/// Largest accepted request body (10 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub bind: String,
    pub port: u16,
    #[serde(skip_serializing, default)]
    pub token: String,
    pub data_dir: PathBuf,
    pub advertise: bool,
    pub body_limit: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            token: DEFAULT_TOKEN.to_string(),
            data_dir: PathBuf::from("data"),
            advertise: true,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl HostConfig {
    pub fn uses_default_token(&self) -> bool {
        self.token == DEFAULT_TOKEN
    }

    /// Socket address to listen on. `bind` must be an IP literal; IPv6
    /// may be given with or without brackets.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid bind address: {}", self.bind)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl std::fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("token", &"[REDACTED]")
            .field("data_dir", &self.data_dir)
            .field("advertise", &self.advertise)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}
