//! Axum router setup and server lifecycle.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::require_token;
use crate::config::HostConfig;
use crate::handlers;
use crate::versions::VersionManager;
use crate::HOST_VERSION;
use lanvault_common::Result;
use lanvault_storage::LocalProvider;
use lanvault_sync::discovery::{Announcement, MdnsAdvertiser, ServiceAdvertiser};
use lanvault_sync::protocol::{API_HEALTH, API_VAULT, API_VAULT_STATUS, API_VERSIONS};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    versions: Arc<VersionManager>,
    token: Arc<str>,
}

impl AppState {
    pub fn new(versions: Arc<VersionManager>, token: &str) -> Self {
        Self {
            versions,
            token: Arc::from(token),
        }
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

pub fn build_router(state: AppState, body_limit: usize) -> Router {
    // Authenticated routes
    let protected = Router::new()
        .route(API_VAULT, get(handlers::get_vault).post(handlers::push_vault))
        .route(API_VAULT_STATUS, get(handlers::vault_status))
        .route(API_VERSIONS, get(handlers::list_versions))
        .route("/api/version/{index}", get(handlers::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    // Unauthenticated routes
    let public = Router::new().route(API_HEALTH, get(handlers::health));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

/// Run the host until Ctrl-C or SIGTERM.
///
/// Opens the history under `config.data_dir`, binds the listener and,
/// unless disabled, advertises the host on the local network for as long
/// as it runs.
pub async fn serve(config: HostConfig) -> Result<()> {
    if config.uses_default_token() {
        warn!("Using the default sync token; set SYNC_TOKEN before exposing this host");
    }

    let provider = Arc::new(LocalProvider::new(&config.data_dir)?);
    let versions = Arc::new(VersionManager::open(provider).await?);
    info!(
        data_dir = %config.data_dir.display(),
        vault_exists = versions.exists().await?,
        "Version history opened"
    );

    let listener = TcpListener::bind(config.listen_addr()?).await?;
    let port = listener.local_addr()?.port();

    let advertisement = if config.advertise {
        match MdnsAdvertiser::new()
            .and_then(|a| a.advertise(&Announcement::sync_host(port, HOST_VERSION)))
        {
            Ok(ad) => Some(ad),
            Err(e) => {
                warn!(error = %e, "Local-network advertisement unavailable");
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(versions, &config.token);
    serve_with_shutdown(listener, state, config.body_limit, shutdown_signal()).await?;

    if let Some(ad) = advertisement {
        ad.withdraw();
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    body_limit: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state, body_limit);
    info!(address = %listener.local_addr()?, "Sync host listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, starting graceful shutdown...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use lanvault_crypto::{CheckHash, Salt};
    use lanvault_storage::MemoryProvider;
    use lanvault_vault::VaultDocument;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    async fn app() -> Router {
        let versions = VersionManager::open(Arc::new(MemoryProvider::new()))
            .await
            .unwrap();
        build_router(AppState::new(Arc::new(versions), TOKEN), 1024 * 1024)
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", token);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn vault_json() -> Value {
        let doc = VaultDocument::new(Salt::from_bytes([1u8; 32]), CheckHash::from_bytes([2u8; 32]));
        serde_json::to_value(doc).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "LanVault Sync Host");
        assert_eq!(body["version"], HOST_VERSION);
    }

    #[tokio::test]
    async fn test_protected_routes_reject_bad_tokens() {
        let app = app().await;
        send(
            &app,
            request("POST", "/api/vault", Some(TOKEN), Some(json!({"vault": vault_json()}))),
        )
        .await;

        for uri in ["/api/vault", "/api/vault/status", "/api/versions", "/api/version/0"] {
            for token in [None, Some("wrong"), Some("Bearer test-token")] {
                let (status, body) = send(&app, request("GET", uri, token, None)).await;
                assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {:?}", uri, token);
                assert_eq!(body, json!({"error": "Unauthorized"}));
            }
        }

        let (status, _) = send(
            &app,
            request("POST", "/api/vault", Some("wrong"), Some(json!({"vault": vault_json()}))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_host() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/api/vault", Some(TOKEN), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Vault not found");

        let (status, _) = send(&app, request("GET", "/api/vault/status", Some(TOKEN), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, request("GET", "/api/versions", Some(TOKEN), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "versions": []}));
    }

    #[tokio::test]
    async fn test_push_then_read() {
        let app = app().await;
        let (status, body) = send(
            &app,
            request("POST", "/api/vault", Some(TOKEN), Some(json!({"vault": vault_json()}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["versionCode"], "v1");
        assert_eq!(body["message"], "Vault uploaded successfully");

        let (_, body) = send(&app, request("GET", "/api/vault", Some(TOKEN), None)).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["versionCode"], "v1");
        assert_eq!(body["vault"]["syncMetadata"]["versionCode"], "v1");

        let (_, body) = send(&app, request("GET", "/api/vault/status", Some(TOKEN), None)).await;
        assert_eq!(body["versionCode"], "v1");
        assert!(body["timestamp"].is_string());
        assert!(body.get("vault").is_none());
    }

    #[tokio::test]
    async fn test_push_without_vault() {
        let app = app().await;
        let (status, body) =
            send(&app, request("POST", "/api/vault", Some(TOKEN), Some(json!({})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Vault data required");
    }

    #[tokio::test]
    async fn test_push_rejects_malformed_document() {
        let app = app().await;
        let (status, _) = send(
            &app,
            request("POST", "/api/vault", Some(TOKEN), Some(json!({"vault": {"entries": 3}}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!app_has_vault(&app).await);
    }

    async fn app_has_vault(app: &Router) -> bool {
        let (status, _) = send(app, request("GET", "/api/vault", Some(TOKEN), None)).await;
        status == StatusCode::OK
    }

    #[tokio::test]
    async fn test_version_index_handling() {
        let app = app().await;
        send(
            &app,
            request("POST", "/api/vault", Some(TOKEN), Some(json!({"vault": vault_json()}))),
        )
        .await;

        for uri in ["/api/version/abc", "/api/version/1abc", "/api/version/0.5"] {
            let (status, body) = send(&app, request("GET", uri, Some(TOKEN), None)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"], "Invalid version index");
        }

        for uri in ["/api/version/1", "/api/version/3", "/api/version/-1"] {
            let (status, body) = send(&app, request("GET", uri, Some(TOKEN), None)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(body["error"], "Version not found");
        }

        let (status, body) = send(&app, request("GET", "/api/version/0", Some(TOKEN), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["versionCode"], "v1");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let versions = VersionManager::open(Arc::new(MemoryProvider::new()))
            .await
            .unwrap();
        let app = build_router(AppState::new(Arc::new(versions), TOKEN), 64);
        let (status, _) = send(
            &app,
            request("POST", "/api/vault", Some(TOKEN), Some(json!({"vault": vault_json()}))),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
