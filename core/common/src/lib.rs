//! Common utilities and types shared across LanVault modules.
//!
//! This module provides the error taxonomy used by every crate in the
//! workspace together with a few small identifier types.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EntryId, SensitiveBytes, StoragePath};
