//! Application context
//!
//! One context is built at startup and passed explicitly to every
//! operation: the storage handle, the validated configuration, the bounded
//! worker pool for CPU-bound ciphertext work, and the per-election lock
//! registry that serializes mutating operations on a single election.
//! There is no process-wide key slot: key material is loaded per operation
//! from the store, so concurrent elections with distinct keys cannot race.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::config::TallyConfig;
use crate::store::Store;
use crate::{Error, Result};

pub struct AppContext {
    store: Arc<dyn Store>,
    config: TallyConfig,
    workers: rayon::ThreadPool,
    locks: parking_lot::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AppContext {
    pub fn new(store: Arc<dyn Store>, config: TallyConfig) -> Result<Self> {
        config.validate_threshold()?;
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_parallelism.max(1))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker pool: {e}")))?;
        Ok(Self {
            store,
            config,
            workers,
            locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    pub fn workers(&self) -> &rayon::ThreadPool {
        &self.workers
    }

    /// Acquire the logical lock for an election. Held for the duration of
    /// the enclosing transaction; operations on other elections proceed
    /// without contention.
    pub async fn lock_election(&self, election_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(election_id).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn context() -> AppContext {
        let config = TallyConfig {
            worker_parallelism: 2,
            ..TallyConfig::default()
        };
        AppContext::new(Arc::new(MemoryStore::new()), config).unwrap()
    }

    #[tokio::test]
    async fn test_same_election_serializes() {
        let ctx = context();
        let id = Uuid::new_v4();
        let first = ctx.lock_election(id).await;
        // A second acquisition for the same election must wait.
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            ctx.lock_election(id),
        )
        .await;
        assert!(second.is_err());
        drop(first);
        // Released locks are reacquirable.
        let _third = ctx.lock_election(id).await;
    }

    #[tokio::test]
    async fn test_distinct_elections_do_not_contend() {
        let ctx = context();
        let _a = ctx.lock_election(Uuid::new_v4()).await;
        let b = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            ctx.lock_election(Uuid::new_v4()),
        )
        .await;
        assert!(b.is_ok());
    }

    #[test]
    fn test_rejects_invalid_threshold() {
        let config = TallyConfig {
            threshold_t: 9,
            threshold_n: 5,
            ..TallyConfig::default()
        };
        assert!(AppContext::new(Arc::new(MemoryStore::new()), config).is_err());
    }
}
