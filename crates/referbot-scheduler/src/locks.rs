//! Per-recipient mutual exclusion.
//!
//! Every evaluate-then-advance runs under the recipient's lock, so the
//! background sweep and a first-contact send can never both deliver the same
//! template. Idle entries are pruned as new locks are handed out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock handed out by [`RecipientLocks::acquire`]. Released on drop.
pub type RecipientGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct RecipientLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RecipientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: &str) -> RecipientGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Only the map holds idle locks; waiters and holders keep a clone.
            locks.retain(|key, l| key == id || Arc::strong_count(l) > 1);
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked recipients (held, awaited or not yet pruned).
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_same_recipient_is_serialized() {
        let locks = Arc::new(RecipientLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let (locks, inside, max_inside) = (locks.clone(), inside.clone(), max_inside.clone());
                tokio::spawn(async move {
                    let _g = locks.acquire("42").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_recipients_do_not_block() {
        let locks = RecipientLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = RecipientLocks::new();
        for id in ["a", "b", "c"] {
            drop(locks.acquire(id).await);
        }
        assert_eq!(locks.len(), 1);

        let _held = locks.acquire("x").await;
        drop(locks.acquire("y").await);
        assert_eq!(locks.len(), 2, "held lock survives pruning");
    }
}
