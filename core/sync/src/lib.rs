//! Multi-device sync for LanVault.
//!
//! This crate provides:
//! - The wire protocol spoken with the sync host
//! - `SyncClient`, a single-request-per-call HTTP client
//! - Local-network discovery and advertisement of the host
//! - `SyncService`, the device-side pull/push surface
//!
//! Sync is whole-document and last-writer-wins. The host tags every accepted
//! push with a version code and content hash so divergence can be detected
//! by a caller, but nothing here merges concurrent edits.

pub mod client;
pub mod config;
pub mod discovery;
pub mod protocol;
pub mod service;

pub use client::{PulledVault, SyncClient};
pub use config::{SyncClientConfig, SyncConfig};
pub use discovery::{
    discover, Advertisement, Announcement, BrowseSession, HostInfo, MdnsAdvertiser, MdnsBrowser,
    MemoryNetwork, ServiceAdvertiser, ServiceBrowser, ServiceRecord,
};
pub use protocol::{SyncOutcome, VersionInfo};
pub use service::SyncService;
