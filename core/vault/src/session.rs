//! Vault session management.
//!
//! A session holds the derived master key in memory for as long as the
//! caller keeps it unlocked. The key is zeroized when the session is locked
//! or dropped. Privileged operations take a `&VaultSession` and refuse to
//! act when it holds no key.

use uuid::Uuid;

use lanvault_crypto::MasterKey;

/// Session handle for tracking active sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// State of the vault session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session is active and the key is available.
    Active,
    /// Session is locked, the key has been cleared.
    Locked,
}

/// Caller-owned unlock state.
pub struct VaultSession {
    handle: SessionHandle,
    master_key: Option<MasterKey>,
}

impl VaultSession {
    /// Create an unlocked session holding `key`.
    pub fn unlocked(key: MasterKey) -> Self {
        Self {
            handle: SessionHandle::new(),
            master_key: Some(key),
        }
    }

    /// Create a session with no key.
    pub fn locked() -> Self {
        Self {
            handle: SessionHandle::new(),
            master_key: None,
        }
    }

    /// Get the session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// The master key, if the session is unlocked.
    pub fn master_key(&self) -> Option<&MasterKey> {
        self.master_key.as_ref()
    }

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        if self.master_key.is_some() {
            SessionState::Active
        } else {
            SessionState::Locked
        }
    }

    /// Check if session is unlocked.
    pub fn is_unlocked(&self) -> bool {
        self.master_key.is_some()
    }

    /// Lock the session, clearing the key from memory.
    ///
    /// # Postconditions
    /// - Master key is zeroized and removed
    /// - Session state is Locked
    pub fn lock(&mut self) {
        // MasterKey zeroizes itself on drop
        self.master_key.take();
    }
}

impl Default for VaultSession {
    fn default() -> Self {
        Self::locked()
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .finish()
    }
}
