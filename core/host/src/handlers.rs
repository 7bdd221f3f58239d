//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info};

use crate::error::HostError;
use crate::server::AppState;
use crate::HOST_VERSION;
use lanvault_common::Error;
use lanvault_sync::protocol::{
    HealthResponse, PushRequest, PushResponse, StatusResponse, VaultResponse, VersionsResponse,
    HOST_SERVICE_NAME, UNKNOWN_VERSION,
};
use lanvault_vault::VaultDocument;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: HOST_SERVICE_NAME.to_string(),
        version: HOST_VERSION.to_string(),
    })
}

pub async fn get_vault(State(state): State<AppState>) -> Result<Json<VaultResponse>, HostError> {
    let vault = state
        .versions()
        .current()
        .await
        .map_err(internal)?
        .ok_or(HostError::VaultNotFound)?;
    Ok(Json(vault_response(vault)))
}

pub async fn push_vault(
    State(state): State<AppState>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, HostError> {
    let Json(request) = payload.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => HostError::PayloadTooLarge,
        _ => HostError::InvalidVaultData(e.body_text()),
    })?;
    let vault = request.vault.ok_or(HostError::VaultRequired)?;
    vault
        .validate()
        .map_err(|e| HostError::InvalidVaultData(e.to_string()))?;

    let version_code = state.versions().push(vault).await.map_err(|e| {
        error!(error = %e, "Error saving vault");
        HostError::SaveFailed
    })?;

    info!(version = %version_code, "Vault uploaded");
    Ok(Json(PushResponse {
        success: true,
        message: "Vault uploaded successfully".to_string(),
        version_code,
    }))
}

pub async fn vault_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, HostError> {
    let status = state
        .versions()
        .status()
        .await
        .map_err(internal)?
        .ok_or(HostError::VaultNotFound)?;
    Ok(Json(StatusResponse {
        success: true,
        version_code: status.version_code,
        timestamp: status.timestamp,
    }))
}

pub async fn list_versions(
    State(state): State<AppState>,
) -> Result<Json<VersionsResponse>, HostError> {
    let versions = state.versions().list_versions().await.map_err(internal)?;
    Ok(Json(VersionsResponse {
        success: true,
        versions,
    }))
}

pub async fn get_version(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<Json<VaultResponse>, HostError> {
    let index: i64 = index
        .trim()
        .parse()
        .map_err(|_| HostError::InvalidVersionIndex)?;
    let index = usize::try_from(index).map_err(|_| HostError::VersionNotFound)?;

    match state.versions().by_index(index).await {
        Ok(vault) => Ok(Json(vault_response(vault))),
        Err(Error::VersionNotFound(_)) => Err(HostError::VersionNotFound),
        Err(e) => Err(internal(e)),
    }
}

fn vault_response(vault: VaultDocument) -> VaultResponse {
    let version_code = vault
        .sync_metadata
        .as_ref()
        .map(|m| m.version_code.clone())
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
    VaultResponse {
        success: true,
        vault,
        version_code,
    }
}

fn internal(e: Error) -> HostError {
    error!(error = %e, "Storage failure");
    HostError::Internal
}
