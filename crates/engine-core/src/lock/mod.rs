use crate::error::LockError;
use std::{sync::Arc, time::Duration};
use tracing::warn;

pub mod memory;
pub mod sled_lock;

/// Proof of ownership handed out on acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        LockToken(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Advisory, TTL-bound mutual exclusion keyed by string.
///
/// Locks expire on their own, so holders must never assume exclusivity past
/// the TTL. Release only removes the entry when `token` still owns it.
pub trait LockManager: Send + Sync {
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    fn release(&self, key: &str, token: &LockToken) -> Result<(), LockError>;
}

/// Held lock that is released when dropped, on every exit path.
pub struct LockGuard {
    manager: Arc<dyn LockManager>,
    key: String,
    token: LockToken,
}

impl LockGuard {
    /// Returns `None` when another holder owns the key.
    pub fn try_acquire(
        manager: &Arc<dyn LockManager>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        let key = key.into();
        let token = manager.try_acquire(&key, ttl)?;
        Ok(token.map(|token| LockGuard {
            manager: Arc::clone(manager),
            key,
            token,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.manager.release(&self.key, &self.token) {
            // The TTL still bounds how long the key stays blocked.
            warn!(key = %self.key, error = %err, "Failed to release lock");
        }
    }
}
