use crate::{
    error::LockError,
    lock::{LockManager, LockToken},
};
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Single-process lock table.
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    entries: Mutex<HashMap<String, (LockToken, Instant)>>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .get(key)
                    .is_some_and(|(_, expires)| *expires > Instant::now())
            })
            .unwrap_or(false)
    }
}

impl LockManager for MemoryLockManager {
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LockError::Backend("lock table poisoned".into()))?;

        let now = Instant::now();
        if let Some((_, expires)) = entries.get(key)
            && *expires > now
        {
            return Ok(None);
        }

        let token = LockToken::generate();
        entries.insert(key.to_string(), (token.clone(), now + ttl));
        Ok(Some(token))
    }

    fn release(&self, key: &str, token: &LockToken) -> Result<(), LockError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LockError::Backend("lock table poisoned".into()))?;

        if entries.get(key).is_some_and(|(owner, _)| owner == token) {
            entries.remove(key);
        }
        Ok(())
    }
}
