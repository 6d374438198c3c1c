use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per key, created on demand.
///
/// Idle entries are dropped once the table grows past a threshold, so the
/// table stays proportional to the keys in flight rather than every key ever
/// locked.
pub struct KeyLocks<K> {
    inner: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyLocks<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.inner.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the table holds an idle entry, so nobody can be waiting on it.
                locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(locks.entry(key).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl<K> Default for KeyLocks<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::<String>::new());
        let guard = locks.lock("a".to_string()).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("a".to_string()).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::<String>::new();
        let _a = locks.lock("a".to_string()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b".to_string())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = KeyLocks::<usize>::new();
        for key in 0..PRUNE_THRESHOLD {
            drop(locks.lock(key).await);
        }
        assert_eq!(locks.len().await, PRUNE_THRESHOLD);

        let _held = locks.lock(PRUNE_THRESHOLD).await;
        assert_eq!(locks.len().await, 1);
    }
}
