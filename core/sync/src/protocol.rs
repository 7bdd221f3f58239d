//! Wire types of the host HTTP surface, shared by client and host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lanvault_common::Result;
use lanvault_vault::VaultDocument;

pub const API_HEALTH: &str = "/api/health";
pub const API_VAULT: &str = "/api/vault";
pub const API_VAULT_STATUS: &str = "/api/vault/status";
pub const API_VERSIONS: &str = "/api/versions";
pub const API_VERSION: &str = "/api/version";

/// Service name reported by the health endpoint.
pub const HOST_SERVICE_NAME: &str = "LanVault Sync Host";

/// Version code reported for a document that carries no sync metadata.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Slot labels, indexed by slot number.
pub const SLOT_LABELS: [&str; 3] = ["current", "previous", "oldest"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Body of `GET /api/vault` and `GET /api/version/{index}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultResponse {
    pub success: bool,
    pub vault: VaultDocument,
    pub version_code: String,
}

/// Body of `POST /api/vault`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub vault: Option<VaultDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    pub message: String,
    pub version_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub version_code: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One retained host snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub index: usize,
    pub label: String,
    pub version_code: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub success: bool,
    pub versions: Vec<VersionInfo>,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Uniform result of a device sync call: `{"success": true, ...data}` or
/// `{"success": false, "error": "..."}`.
///
/// `T` must serialize as a JSON object; its fields are inlined.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> SyncOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Back to a plain result, with the failure message as the error.
    pub fn into_result(self) -> std::result::Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self.error.unwrap_or_else(|| "Unknown error".to_string())),
        }
    }
}

impl<T> From<Result<T>> for SyncOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}
