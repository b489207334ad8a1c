use crate::{
    error::LockError,
    lock::{LockManager, LockToken},
};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::time::Duration;

#[derive(Serialize, Deserialize)]
struct LockEntry {
    token: String,
    expires_at_ms: i64,
}

/// Lock table stored as TTL-stamped rows in a sled tree.
///
/// Expired rows are overwritten lazily by the next acquirer.
pub struct SledLockManager {
    tree: sled::Tree,
}

impl SledLockManager {
    pub fn new(db: &sled::Db) -> Result<Self, LockError> {
        Ok(Self {
            tree: db.open_tree("import_locks")?,
        })
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

fn abort(err: bincode::Error) -> ConflictableTransactionError<LockError> {
    ConflictableTransactionError::Abort(LockError::Backend(err.to_string()))
}

fn flatten<T>(result: Result<T, TransactionError<LockError>>) -> Result<T, LockError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(LockError::Sled(e)),
    }
}

impl LockManager for SledLockManager {
    fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let token = LockToken::generate();
        let entry = LockEntry {
            token: token.as_str().to_string(),
            expires_at_ms: Self::now_ms() + ttl.as_millis() as i64,
        };
        let bytes = bincode::serialize(&entry).map_err(|e| LockError::Backend(e.to_string()))?;

        let acquired = self.tree.transaction::<_, _, LockError>(|tx| {
            if let Some(existing) = tx.get(key)? {
                let held: LockEntry = bincode::deserialize(&existing).map_err(abort)?;
                if held.expires_at_ms > Self::now_ms() {
                    return Ok(false);
                }
            }
            tx.insert(key, bytes.as_slice())?;
            Ok(true)
        });

        Ok(flatten(acquired)?.then_some(token))
    }

    fn release(&self, key: &str, token: &LockToken) -> Result<(), LockError> {
        let released = self.tree.transaction::<_, _, LockError>(|tx| {
            if let Some(existing) = tx.get(key)? {
                let held: LockEntry = bincode::deserialize(&existing).map_err(abort)?;
                if held.token == token.as_str() {
                    tx.remove(key)?;
                }
            }
            Ok(())
        });

        flatten(released)
    }
}
