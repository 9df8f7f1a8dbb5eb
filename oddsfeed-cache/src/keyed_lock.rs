//! Keyed mutual exclusion over a bounded pool of reusable slots.
//!
//! A slot is assigned to a key on first acquisition and shared by every
//! acquirer of that key until its usage counter drops back to zero, at which
//! point the slot returns to the pool. Acquirers of a key that already owns a
//! slot never wait for the pool; only a brand new key does when every slot is
//! in use.
//!
//! ```text
//! acquire(k) ──► slot for k? ── yes ──► users += 1 ──► lock slot mutex
//!                    │
//!                    no ──► take pool permit (park while exhausted) ──► new slot
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use oddsfeed_core::{CacheError, ExceptionStrategy};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Pseudo-key serializing store-wide bulk operations.
pub const BULK_KEY: &str = "__bulk__";

struct SlotEntry {
    mutex: Arc<Mutex<()>>,
    /// Holders plus waiters currently referencing this slot.
    users: usize,
    /// Returned to the pool when the entry is dropped.
    _permit: OwnedSemaphorePermit,
}

struct KeyedLockInner {
    slots: DashMap<String, SlotEntry>,
    permits: Arc<Semaphore>,
    capacity: usize,
    strategy: ExceptionStrategy,
}

impl KeyedLockInner {
    fn release_slot(&self, key: &str) -> Result<(), CacheError> {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.users = entry.users.saturating_sub(1);
                if entry.users == 0 {
                    occupied.remove();
                }
                Ok(())
            }
            Entry::Vacant(_) => Err(CacheError::LockNotHeld {
                key: key.to_string(),
            }),
        }
    }
}

/// Pool of reusable mutexes associated on demand with string keys.
#[derive(Clone)]
pub struct KeyedLock {
    inner: Arc<KeyedLockInner>,
}

impl KeyedLock {
    /// Create a pool holding at most `capacity` distinct keys at once.
    pub fn new(capacity: usize, strategy: ExceptionStrategy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(KeyedLockInner {
                slots: DashMap::new(),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                strategy,
            }),
        }
    }

    /// Acquire exclusive access for `key`.
    ///
    /// Waits while another holder owns the key, and, for a key with no slot
    /// yet, while the pool is exhausted. Dropping the returned guard (or the
    /// pending future) always gives the slot back.
    pub async fn acquire(&self, key: &str) -> Result<KeyedLockGuard, CacheError> {
        let mutex = self.checkout(key).await?;
        let ticket = SlotTicket {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            released: false,
        };
        let guard = mutex.lock_owned().await;
        Ok(KeyedLockGuard {
            guard: Some(guard),
            ticket,
        })
    }

    async fn checkout(&self, key: &str) -> Result<Arc<Mutex<()>>, CacheError> {
        if let Some(mut entry) = self.inner.slots.get_mut(key) {
            entry.users += 1;
            return Ok(Arc::clone(&entry.mutex));
        }

        let permit = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                tracing::trace!(key, capacity = self.inner.capacity, "Keyed lock pool exhausted, parking");
                Arc::clone(&self.inner.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| CacheError::LockPoolClosed)?
            }
            Err(TryAcquireError::Closed) => return Err(CacheError::LockPoolClosed),
        };

        // Another acquirer may have assigned a slot while we waited; the
        // spare permit then goes straight back to the pool.
        match self.inner.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.users += 1;
                Ok(Arc::clone(&entry.mutex))
            }
            Entry::Vacant(vacant) => {
                let mutex = Arc::new(Mutex::new(()));
                vacant.insert(SlotEntry {
                    mutex: Arc::clone(&mutex),
                    users: 1,
                    _permit: permit,
                });
                Ok(mutex)
            }
        }
    }

    /// Release one usage of `key` without a guard.
    ///
    /// Only needed by callers that manage slots by key; guards release
    /// themselves. Releasing a key with no outstanding acquisition is logged
    /// and, under [`ExceptionStrategy::Propagate`], returned as an error.
    pub fn release_key(&self, key: &str) -> Result<(), CacheError> {
        report(&self.inner, self.inner.release_slot(key))
    }

    /// Number of keys currently owning a slot.
    pub fn held_keys(&self) -> usize {
        self.inner.slots.len()
    }

    /// Whether `key` currently owns a slot.
    pub fn is_assigned(&self, key: &str) -> bool {
        self.inner.slots.contains_key(key)
    }

    /// Slots still free for new keys.
    pub fn available_slots(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Close the pool: parked and future acquisitions for new keys fail.
    pub fn close(&self) {
        self.inner.permits.close();
    }
}

impl std::fmt::Debug for KeyedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLock")
            .field("capacity", &self.inner.capacity)
            .field("held_keys", &self.inner.slots.len())
            .finish()
    }
}

fn report(inner: &KeyedLockInner, result: Result<(), CacheError>) -> Result<(), CacheError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(error = %err, "Keyed lock release without acquisition");
            match inner.strategy {
                ExceptionStrategy::Propagate => Err(err),
                ExceptionStrategy::Suppress => Ok(()),
            }
        }
    }
}

/// Usage registration on a slot, held from checkout until release.
struct SlotTicket {
    inner: Arc<KeyedLockInner>,
    key: String,
    released: bool,
}

impl SlotTicket {
    fn release(&mut self) -> Result<(), CacheError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        report(&self.inner, self.inner.release_slot(&self.key))
    }
}

impl Drop for SlotTicket {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Exclusive access to one key. Released on drop.
pub struct KeyedLockGuard {
    // Field order matters: the mutex unlocks before the slot is given back.
    guard: Option<OwnedMutexGuard<()>>,
    ticket: SlotTicket,
}

impl KeyedLockGuard {
    pub fn key(&self) -> &str {
        &self.ticket.key
    }

    /// Release explicitly, surfacing a release anomaly under `Propagate`.
    pub fn release(mut self) -> Result<(), CacheError> {
        self.guard.take();
        self.ticket.release()
    }
}

impl std::fmt::Debug for KeyedLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLockGuard")
            .field("key", &self.ticket.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_mutually_exclusive() {
        let lock = KeyedLock::new(16, ExceptionStrategy::Propagate);
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lock = lock.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = lock.acquire("sr:match:1").await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(lock.held_keys(), 0);
        assert_eq!(lock.available_slots(), 16);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let lock = KeyedLock::new(4, ExceptionStrategy::Propagate);
        let _a = lock.acquire("a").await.unwrap();
        let b = tokio::time::timeout(Duration::from_millis(100), lock.acquire("b")).await;
        assert!(b.is_ok(), "different key must not wait");
        assert_eq!(lock.held_keys(), 2);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_parks_new_keys_only() {
        let lock = KeyedLock::new(1, ExceptionStrategy::Propagate);
        let held = lock.acquire("a").await.unwrap();

        // A new key has to wait for the single slot.
        let blocked = tokio::time::timeout(Duration::from_millis(50), lock.acquire("b")).await;
        assert!(blocked.is_err());

        // The same key reuses its slot and only waits for the holder.
        let lock2 = lock.clone();
        let waiter = tokio::spawn(async move { lock2.acquire("a").await.map(|g| g.key().to_string()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(lock.held_keys(), 1);
        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), "a");

        // Slot returned: the new key proceeds.
        let b = tokio::time::timeout(Duration::from_millis(100), lock.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_returns_slot() {
        let lock = KeyedLock::new(2, ExceptionStrategy::Propagate);
        let held = lock.acquire("k").await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(20), lock.acquire("k")).await;
        assert!(pending.is_err());
        drop(held);
        assert_eq!(lock.held_keys(), 0);
        assert_eq!(lock.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let lock = KeyedLock::new(2, ExceptionStrategy::Propagate);
        let guard = lock.acquire("k").await.unwrap();
        assert!(lock.is_assigned("k"));
        guard.release().unwrap();
        assert!(!lock.is_assigned("k"));
    }

    #[test]
    fn test_release_without_acquisition_depends_on_strategy() {
        let strict = KeyedLock::new(2, ExceptionStrategy::Propagate);
        assert!(matches!(
            strict.release_key("ghost"),
            Err(CacheError::LockNotHeld { ref key }) if key == "ghost"
        ));

        let lenient = KeyedLock::new(2, ExceptionStrategy::Suppress);
        assert!(lenient.release_key("ghost").is_ok());
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_new_keys() {
        let lock = KeyedLock::new(1, ExceptionStrategy::Propagate);
        let held = lock.acquire("a").await.unwrap();
        lock.close();
        assert!(matches!(lock.acquire("b").await, Err(CacheError::LockPoolClosed)));
        drop(held);
    }
}
