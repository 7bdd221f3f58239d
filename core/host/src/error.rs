//! Host error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use lanvault_sync::protocol::ErrorBody;

/// Request failures mapped to HTTP status codes and a `{"error": ...}` body.
///
/// Messages never carry vault content; storage details stay in the logs.
#[derive(Debug)]
pub enum HostError {
    Unauthorized,
    VaultNotFound,
    VaultRequired,
    InvalidVaultData(String),
    InvalidVersionIndex,
    VersionNotFound,
    PayloadTooLarge,
    SaveFailed,
    Internal,
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::VaultNotFound => write!(f, "Vault not found"),
            Self::VaultRequired => write!(f, "Vault data required"),
            Self::InvalidVaultData(e) => write!(f, "Invalid vault data: {}", e),
            Self::InvalidVersionIndex => write!(f, "Invalid version index"),
            Self::VersionNotFound => write!(f, "Version not found"),
            Self::PayloadTooLarge => write!(f, "Payload too large"),
            Self::SaveFailed => write!(f, "Failed to save vault"),
            Self::Internal => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for HostError {}

impl HostError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::VaultNotFound | Self::VersionNotFound => StatusCode::NOT_FOUND,
            Self::VaultRequired | Self::InvalidVaultData(_) | Self::InvalidVersionIndex => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::SaveFailed | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HostError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(HostError::VaultNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(HostError::VaultRequired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(HostError::InvalidVersionIndex.status(), StatusCode::BAD_REQUEST);
        assert_eq!(HostError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(HostError::SaveFailed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
