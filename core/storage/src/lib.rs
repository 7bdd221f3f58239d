//! Storage provider abstraction for LanVault.
//!
//! Vault documents and host snapshots are persisted as whole objects
//! through the [`StorageProvider`] trait. Two backends are provided:
//! the local filesystem (atomic write-then-rename) and an in-memory map
//! used by tests.
//!
//! # Design Principles
//! - Whole-object reads and writes; no partial updates
//! - A write either fully replaces the object or leaves the old one intact
//! - Async operations throughout

pub mod local;
pub mod memory;
pub mod provider;

pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use provider::StorageProvider;
