//! LanVault sync host.
//!
//! Keeps the last three pushed vault documents and serves them over a
//! token-gated HTTP surface:
//!
//! | Route | Auth | Purpose |
//! |---|---|---|
//! | `GET /api/health` | no | liveness |
//! | `GET /api/vault` | yes | current document |
//! | `POST /api/vault` | yes | replace document, rotating history |
//! | `GET /api/vault/status` | yes | version code and timestamp only |
//! | `GET /api/versions` | yes | retained snapshots |
//! | `GET /api/version/{index}` | yes | one snapshot by slot |
//!
//! The host never sees key material; documents arrive already encrypted
//! per field.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod versions;

pub use config::HostConfig;
pub use error::HostError;
pub use server::{build_router, serve, serve_with_shutdown, AppState};
pub use versions::VersionManager;

/// Version reported by the health endpoint and the advertisement.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");
