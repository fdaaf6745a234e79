//! Process-wide named locks.
//!
//! Each name maps to its own async mutex, created on first use. Holding the
//! returned guard holds the lock; dropping it unlocks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock called `name`, waiting for any current holder.
    pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let mutex = self.get_or_create(name);
        let guard = mutex.lock_owned().await;
        tracing::trace!(lock = %name, "Acquired named lock");
        guard
    }

    /// Acquire the lock called `name` only if nobody holds it.
    pub fn try_lock(&self, name: &str) -> Option<OwnedMutexGuard<()>> {
        self.get_or_create(name).try_lock_owned().ok()
    }

    fn get_or_create(&self, name: &str) -> Arc<Mutex<()>> {
        // The map shard lock is released before awaiting on the mutex
        Arc::clone(
            self.locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_excludes_same_name() {
        let locks = LockManager::new();

        let guard = locks.lock("a").await;
        assert!(locks.try_lock("a").is_none());

        drop(guard);
        assert!(locks.try_lock("a").is_some());
    }

    #[tokio::test]
    async fn test_distinct_names_are_independent() {
        let locks = LockManager::new();

        let _a = locks.lock("a").await;
        assert!(locks.try_lock("b").is_some());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_unlock() {
        let locks = Arc::new(LockManager::new());
        let guard = locks.lock("shared").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("shared").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire the lock")
            .unwrap();
    }
}
