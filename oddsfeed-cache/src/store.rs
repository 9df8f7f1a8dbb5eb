//! Concurrent id → item store with copy-on-write merges.
//!
//! Readers get `Arc` snapshots and never block on writers. A write runs under
//! the map's entry lock: when no snapshot of the item is alive the item is
//! mutated in place, otherwise a private copy is mutated and swapped in.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use oddsfeed_core::EntityId;

use crate::item::CacheItem;

struct StoredItem<T> {
    item: Arc<T>,
    /// Milliseconds since the store epoch.
    last_access: AtomicU64,
}

pub struct ItemStore<T> {
    items: DashMap<EntityId, StoredItem<T>>,
    epoch: Instant,
}

impl<T: CacheItem> ItemStore<T> {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Snapshot of `id`, refreshing its last-access stamp.
    pub fn get(&self, id: &EntityId) -> Option<Arc<T>> {
        let now = self.now_millis();
        self.items.get(id).map(|stored| {
            stored.last_access.store(now, Ordering::Relaxed);
            Arc::clone(&stored.item)
        })
    }

    /// Snapshot of `id` without touching its last-access stamp.
    pub fn peek(&self, id: &EntityId) -> Option<Arc<T>> {
        self.items.get(id).map(|stored| Arc::clone(&stored.item))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.items.contains_key(id)
    }

    /// Apply `update` to the item for `id`, creating an empty one first if needed.
    ///
    /// Concurrent upserts of the same id are serialized; the returned snapshot
    /// includes this update.
    pub fn upsert<F>(&self, id: &EntityId, update: F) -> Arc<T>
    where
        F: FnOnce(&mut T),
    {
        let now = self.now_millis();
        let mut slot = self.items.entry(id.clone()).or_insert_with(|| StoredItem {
            item: Arc::new(T::new(id.clone())),
            last_access: AtomicU64::new(now),
        });
        update(Arc::make_mut(&mut slot.item));
        slot.last_access.store(now, Ordering::Relaxed);
        Arc::clone(&slot.item)
    }

    /// Insert or replace the item stored under its own id.
    pub fn insert(&self, item: T) -> Arc<T> {
        let item = Arc::new(item);
        self.items.insert(
            item.id().clone(),
            StoredItem {
                item: Arc::clone(&item),
                last_access: AtomicU64::new(self.now_millis()),
            },
        );
        item
    }

    pub fn remove(&self, id: &EntityId) -> Option<Arc<T>> {
        self.items.remove(id).map(|(_, stored)| stored.item)
    }

    /// Remove every item matching `predicate`. Returns the number removed.
    pub fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|_, stored| !predicate(&stored.item));
        before.saturating_sub(self.items.len())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&self) {
        self.items.clear();
    }

    /// Every id, sorted.
    pub fn keys(&self) -> Vec<EntityId> {
        let mut keys: Vec<EntityId> = self.items.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Every item, sorted by id.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        let mut items: Vec<Arc<T>> = self
            .items
            .iter()
            .map(|entry| Arc::clone(&entry.item))
            .collect();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        items
    }

    /// Item count per entity kind name.
    pub fn census(&self) -> BTreeMap<String, usize> {
        let mut census = BTreeMap::new();
        for entry in self.items.iter() {
            *census
                .entry(entry.key().kind().as_str().to_string())
                .or_insert(0) += 1;
        }
        census
    }

    /// Drop items not accessed for at least `ttl`. Returns the number removed.
    pub fn purge_idle(&self, ttl: Duration) -> usize {
        let now = self.now_millis();
        let ttl = ttl.as_millis() as u64;
        let before = self.items.len();
        self.items.retain(|_, stored| {
            now.saturating_sub(stored.last_access.load(Ordering::Relaxed)) < ttl
        });
        before.saturating_sub(self.items.len())
    }
}

impl<T: CacheItem> Default for ItemStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ItemStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore")
            .field("len", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SportItem;
    use oddsfeed_core::Locale;
    use oddsfeed_test_utils::fixtures::*;

    #[test]
    fn test_upsert_creates_then_updates() {
        let store: ItemStore<SportItem> = ItemStore::new();
        let en = Locale::new("en");
        store.upsert(&sport_id(1), |item| {
            item.names.insert(en.clone(), "Soccer".into());
        });
        let item = store.upsert(&sport_id(1), |item| {
            item.fetched_locales.insert(en.clone());
        });
        assert_eq!(item.name(&en), Some("Soccer"));
        assert!(item.fetched_locales.contains(&en));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshots_are_not_mutated_by_later_writes() {
        let store: ItemStore<SportItem> = ItemStore::new();
        let en = Locale::new("en");
        store.upsert(&sport_id(1), |item| {
            item.names.insert(en.clone(), "Soccer".into());
        });
        let before = store.get(&sport_id(1)).unwrap();
        store.upsert(&sport_id(1), |item| {
            item.names.insert(en.clone(), "Football".into());
        });
        assert_eq!(before.name(&en), Some("Soccer"));
        assert_eq!(store.get(&sport_id(1)).unwrap().name(&en), Some("Football"));
    }

    #[test]
    fn test_snapshot_and_keys_are_sorted() {
        let store: ItemStore<SportItem> = ItemStore::new();
        for n in [3, 1, 2] {
            store.insert(SportItem::new(sport_id(n)));
        }
        assert_eq!(store.keys(), vec![sport_id(1), sport_id(2), sport_id(3)]);
        let ids: Vec<EntityId> = store.snapshot().iter().map(|item| item.id.clone()).collect();
        assert_eq!(ids, store.keys());
        assert_eq!(store.census().get("Sport"), Some(&3));
    }

    #[test]
    fn test_purge_idle_keeps_recently_used() {
        let store: ItemStore<SportItem> = ItemStore::new();
        store.insert(SportItem::new(sport_id(1)));
        store.insert(SportItem::new(sport_id(2)));
        std::thread::sleep(Duration::from_millis(30));
        store.get(&sport_id(2));

        assert_eq!(store.purge_idle(Duration::from_millis(20)), 1);
        assert!(store.contains(&sport_id(2)));
        assert!(!store.contains(&sport_id(1)));
    }

    #[test]
    fn test_remove_where() {
        let store: ItemStore<SportItem> = ItemStore::new();
        store.insert(SportItem::new(sport_id(1)));
        store.upsert(&sport_id(2), |item| {
            item.names.insert(Locale::new("en"), "Tennis".into());
        });
        assert_eq!(store.remove_where(|item| item.is_placeholder()), 1);
        assert_eq!(store.keys(), vec![sport_id(2)]);
    }
}
