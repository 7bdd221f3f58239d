//! Static token check for protected routes.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::HostError;
use crate::server::AppState;

/// Reject the request unless its raw `Authorization` header equals the
/// configured token. The comparison runs in constant time.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, HostError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if !token_matches(presented, state.token().as_bytes()) {
        warn!(path = %request.uri().path(), "Rejected request with bad token");
        return Err(HostError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn token_matches(presented: &[u8], expected: &[u8]) -> bool {
    !presented.is_empty() && bool::from(presented.ct_eq(expected))
}
