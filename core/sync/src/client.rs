//! HTTP client for the sync host.
//!
//! Every call is a single request carrying the raw token in the
//! `Authorization` header. Nothing is retried here; callers decide.

use reqwest::header::AUTHORIZATION;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::{debug, info};

use crate::config::{SyncClientConfig, SyncConfig};
use crate::protocol::{
    ErrorBody, HealthResponse, PushRequest, PushResponse, StatusResponse, VaultResponse,
    VersionInfo, VersionsResponse, API_HEALTH, API_VAULT, API_VAULT_STATUS, API_VERSION,
    API_VERSIONS,
};
use lanvault_common::{Error, Result};
use lanvault_vault::VaultDocument;

/// A vault document fetched from the host, with its version code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulledVault {
    pub vault: VaultDocument,
    pub version_code: String,
}

/// How a 404 from a given endpoint should be reported.
#[derive(Debug, Clone, Copy)]
enum Missing {
    Vault,
    Version(usize),
}

/// HTTP client for the LanVault sync host.
pub struct SyncClient {
    http: reqwest::Client,
    config: RwLock<SyncConfig>,
}

impl SyncClient {
    /// Create an unconfigured client.
    pub fn new(settings: &SyncClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config: RwLock::new(SyncConfig::default()),
        })
    }

    /// Point the client at a host. Persisting the settings is up to the caller.
    pub fn set_config(&self, host_url: &str, auth_token: &str) -> Result<()> {
        let config = SyncConfig::new(host_url, auth_token)?;
        *self.config.write().map_err(|_| Self::poisoned())? = config;
        Ok(())
    }

    /// Current settings.
    pub fn config(&self) -> SyncConfig {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Both host URL and token are set.
    pub fn is_configured(&self) -> bool {
        self.config().is_complete()
    }

    /// Query the unauthenticated health endpoint. Only the URL is required.
    pub async fn test_connection(&self) -> Result<HealthResponse> {
        let base = self
            .config()
            .host_url
            .ok_or_else(|| Error::NotConfigured("Host URL not configured".to_string()))?;

        let response = self
            .http
            .get(format!("{}{}", base, API_HEALTH))
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response, None).await
    }

    /// Version code and timestamp of the host's current vault.
    pub async fn get_status(&self) -> Result<StatusResponse> {
        self.get(API_VAULT_STATUS, Some(Missing::Vault)).await
    }

    /// Fetch the host's current vault.
    pub async fn pull_vault(&self) -> Result<PulledVault> {
        let body: VaultResponse = self.get(API_VAULT, Some(Missing::Vault)).await?;
        debug!(version = %body.version_code, entries = body.vault.entries.len(), "Vault pulled");
        Ok(PulledVault {
            vault: body.vault,
            version_code: body.version_code,
        })
    }

    /// Fetch a retained snapshot by slot index (0 = current).
    pub async fn get_version(&self, index: usize) -> Result<PulledVault> {
        let path = format!("{}/{}", API_VERSION, index);
        let body: VaultResponse = self.get(&path, Some(Missing::Version(index))).await?;
        Ok(PulledVault {
            vault: body.vault,
            version_code: body.version_code,
        })
    }

    /// Replace the host's vault. Returns the version code assigned to it.
    pub async fn push_vault(&self, vault: &VaultDocument) -> Result<String> {
        let (base, token) = self.credentials()?;
        let request = PushRequest {
            vault: Some(vault.clone()),
        };

        let response = self
            .http
            .post(format!("{}{}", base, API_VAULT))
            .header(AUTHORIZATION, token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let body: PushResponse = read_json(response, None).await?;

        info!(version = %body.version_code, "Vault pushed");
        Ok(body.version_code)
    }

    /// Snapshots the host retains, newest first.
    pub async fn list_versions(&self) -> Result<Vec<VersionInfo>> {
        let body: VersionsResponse = self.get(API_VERSIONS, None).await?;
        Ok(body.versions)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, missing: Option<Missing>) -> Result<T> {
        let (base, token) = self.credentials()?;
        let response = self
            .http
            .get(format!("{}{}", base, path))
            .header(AUTHORIZATION, token)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response, missing).await
    }

    fn credentials(&self) -> Result<(String, String)> {
        let config = self.config();
        match (config.host_url, config.auth_token) {
            (Some(url), Some(token)) => Ok((url, token)),
            _ => Err(Error::NotConfigured(
                "Host URL and token are required".to_string(),
            )),
        }
    }

    fn poisoned() -> Error {
        Error::InvalidInput("Sync config lock poisoned".to_string())
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Network(e.to_string())
}

async fn read_json<T: DeserializeOwned>(response: Response, missing: Option<Missing>) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| Error::Network(format!("Invalid response from host: {}", e)));
    }

    match (status, missing) {
        (StatusCode::UNAUTHORIZED, _) => return Err(Error::Unauthorized),
        (StatusCode::NOT_FOUND, Some(Missing::Vault)) => {
            return Err(Error::VaultNotFound("sync host has no vault".to_string()))
        }
        (StatusCode::NOT_FOUND, Some(Missing::Version(index))) => {
            return Err(Error::VersionNotFound(index))
        }
        _ => {}
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| format!("Host returned {}", status));
    Err(Error::Network(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::{Json, Router};

    async fn spawn_stub() -> String {
        let app = Router::new()
            .route(
                API_HEALTH,
                get(|| async {
                    Json(HealthResponse {
                        status: "ok".to_string(),
                        service: "stub".to_string(),
                        version: "0".to_string(),
                    })
                }),
            )
            .route(
                API_VAULT_STATUS,
                get(|headers: HeaderMap| async move {
                    let authorized = headers
                        .get("authorization")
                        .is_some_and(|v| v.as_bytes() == b"good");
                    if !authorized {
                        return (
                            axum::http::StatusCode::UNAUTHORIZED,
                            Json(serde_json::json!({"error": "Unauthorized"})),
                        );
                    }
                    (
                        axum::http::StatusCode::NOT_FOUND,
                        Json(serde_json::json!({"error": "Vault not found"})),
                    )
                }),
            )
            .route(
                API_VERSIONS,
                get(|| async {
                    (
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({"error": "disk on fire"})),
                    )
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client() -> SyncClient {
        SyncClient::new(&SyncClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_calls_fail() {
        let client = client();
        assert!(!client.is_configured());
        assert!(matches!(
            client.test_connection().await,
            Err(Error::NotConfigured(_))
        ));
        assert!(matches!(client.pull_vault().await, Err(Error::NotConfigured(_))));
        assert!(matches!(client.list_versions().await, Err(Error::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_connection_needs_only_url() {
        let base = spawn_stub().await;
        let client = client();
        *client.config.write().unwrap() = SyncConfig {
            host_url: Some(base),
            auth_token: None,
        };

        let health = client.test_connection().await.unwrap();
        assert_eq!(health.status, "ok");
        assert!(matches!(client.get_status().await, Err(Error::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let base = spawn_stub().await;
        let client = client();

        client.set_config(&base, "bad").unwrap();
        assert!(matches!(client.get_status().await, Err(Error::Unauthorized)));

        client.set_config(&base, "good").unwrap();
        assert!(matches!(client.get_status().await, Err(Error::VaultNotFound(_))));

        match client.list_versions().await {
            Err(Error::Network(message)) => assert_eq!(message, "disk on fire"),
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client();
        client.set_config(&format!("http://{}", addr), "tok").unwrap();
        assert!(matches!(client.get_status().await, Err(Error::Network(_))));
    }
}
