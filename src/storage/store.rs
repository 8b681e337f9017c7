//! The keyed store behind sessions and short-lived scheduling
//! artifacts: plain key/value with per-key TTL, atomic set-add and an
//! expiring lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::error::StorageError;

/// Keyed store contract.
///
/// Reads may be stale between nodes; per-key writes are sequentially
/// consistent. The deduplicator depends on `set_add` returning a
/// reliable newly-added flag.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn del(&self, key: &str) -> Result<(), StorageError>;

    /// Add `member` to the set at `key`, creating it with `ttl` when
    /// absent. Returns whether the member was newly added.
    async fn set_add(
        &self,
        key: &str,
        member: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StorageError>;

    async fn set_members(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError>;

    /// Try to take the named lock. Returns false when it is already
    /// held; the lock expires on its own after `ttl`.
    async fn lock(&self, key: &str, ttl: Duration) -> Result<bool, StorageError>;
}

/// Spin on [`Store::lock`] until acquired or `timeout` elapses.
pub async fn acquire_lock(
    store: &dyn Store,
    key: &str,
    ttl: Duration,
    timeout: Duration,
) -> Result<(), StorageError> {
    let started = Instant::now();
    loop {
        if store.lock(key, ttl).await? {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(StorageError::LockTimeout(key.to_string()));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct ValueEntry {
    value: Vec<u8>,
    deadline: Instant,
}

struct SetEntry {
    members: Vec<Vec<u8>>,
    deadline: Instant,
}

#[derive(Default)]
struct Inner {
    kv: HashMap<String, ValueEntry>,
    sets: HashMap<String, SetEntry>,
}

/// In-process [`Store`] with per-entry deadlines. Expired entries are
/// reaped lazily on access and by [`MemoryStore::sweep`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        inner.kv.retain(|_, e| e.deadline > now);
        inner.sets.retain(|_, e| e.deadline > now);
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-update; propagating the
        // panic is the only sound option for an in-process store.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("memory store mutex poisoned: {}", poisoned),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StorageError> {
        let mut inner = self.lock_inner();
        inner.kv.insert(
            key.to_string(),
            ValueEntry {
                value,
                deadline: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        match inner.kv.get(key) {
            Some(e) if e.deadline > now => Ok(Some(e.value.clone())),
            Some(_) => {
                inner.kv.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.lock_inner();
        inner.kv.remove(key);
        inner.sets.remove(key);
        Ok(())
    }

    async fn set_add(
        &self,
        key: &str,
        member: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();

        let entry = inner.sets.entry(key.to_string()).or_insert(SetEntry {
            members: Vec::new(),
            deadline: now + ttl,
        });
        if entry.deadline <= now {
            entry.members.clear();
        }
        // every add re-arms the expiry, like an EXPIRE after each SADD
        entry.deadline = now + ttl;
        if entry.members.contains(&member) {
            return Ok(false);
        }
        entry.members.push(member);
        Ok(true)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        match inner.sets.get(key) {
            Some(e) if e.deadline > now => Ok(e.members.clone()),
            Some(_) => {
                inner.sets.remove(key);
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn lock(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut inner = self.lock_inner();
        match inner.kv.get(key) {
            Some(e) if e.deadline > now => Ok(false),
            _ => {
                inner.kv.insert(
                    key.to_string(),
                    ValueEntry {
                        value: Vec::new(),
                        deadline: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_del_round_trip() {
        let store = MemoryStore::new();
        store
            .put("k", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryStore::new();
        store
            .put("k", b"v".to_vec(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_add_reports_newly_added() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.set_add("s", b"a".to_vec(), ttl).await.unwrap());
        assert!(!store.set_add("s", b"a".to_vec(), ttl).await.unwrap());
        assert!(store.set_add("s", b"b".to_vec(), ttl).await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_expiry() {
        let store = MemoryStore::new();
        assert!(store.lock("l", Duration::from_millis(30)).await.unwrap());
        assert!(!store.lock("l", Duration::from_millis(30)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.lock("l", Duration::from_millis(30)).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_reaps_expired_entries() {
        let store = MemoryStore::new();
        store
            .put("k", b"v".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();
        store
            .set_add("s", b"m".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.sweep();
        let inner = store.lock_inner();
        assert!(inner.kv.is_empty());
        assert!(inner.sets.is_empty());
    }
}
