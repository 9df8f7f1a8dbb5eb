//! Negative cache: ids confirmed absent remotely, per locale.
//!
//! A miss recorded for locale A says nothing about locale B. Entries stay until
//! cleared (a successful fetch proving existence, or an invalidation) unless a
//! TTL is configured.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use oddsfeed_core::{EntityId, Locale, Timestamp};

/// Records `(id, locale)` pairs known not to exist remotely.
#[derive(Debug, Default)]
pub struct NegativeCache {
    entries: DashMap<EntityId, BTreeMap<Locale, Timestamp>>,
    ttl: Option<Duration>,
}

impl NegativeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a negative cache whose entries expire after `ttl`.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Record that `id` is absent for `locale`. Keeps the first-seen timestamp.
    pub fn mark_missing(&self, id: &EntityId, locale: &Locale) {
        let now = Utc::now();
        let mut entry = self.entries.entry(id.clone()).or_default();
        entry
            .entry(locale.clone())
            .and_modify(|seen| {
                if self.is_expired(*seen, now) {
                    *seen = now;
                }
            })
            .or_insert(now);
    }

    /// Whether `id` is known to be absent for `locale`.
    pub fn is_known_missing(&self, id: &EntityId, locale: &Locale) -> bool {
        let now = Utc::now();
        self.entries
            .get(id)
            .and_then(|locales| locales.get(locale).copied())
            .map(|seen| !self.is_expired(seen, now))
            .unwrap_or(false)
    }

    /// Whether `id` is known to be absent for at least one locale.
    pub fn is_known_missing_anywhere(&self, id: &EntityId) -> bool {
        let now = Utc::now();
        self.entries
            .get(id)
            .map(|locales| locales.values().any(|seen| !self.is_expired(*seen, now)))
            .unwrap_or(false)
    }

    /// When `id` was first recorded missing for `locale`.
    pub fn first_seen(&self, id: &EntityId, locale: &Locale) -> Option<Timestamp> {
        self.entries
            .get(id)
            .and_then(|locales| locales.get(locale).copied())
    }

    /// Forget every locale recorded for `id`. Returns whether anything was removed.
    pub fn clear(&self, id: &EntityId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Forget everything.
    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Drop expired entries. Returns the number of `(id, locale)` pairs removed.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let now = Utc::now();
        let mut removed = 0;
        self.entries.retain(|_, locales| {
            let before = locales.len();
            locales.retain(|_, seen| !self.is_expired(*seen, now));
            removed += before - locales.len();
            !locales.is_empty()
        });
        removed
    }

    /// Number of ids with at least one recorded miss.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, seen: Timestamp, now: Timestamp) -> bool {
        match self.ttl {
            Some(ttl) => now
                .signed_duration_since(seen)
                .to_std()
                .map(|age| age >= ttl)
                .unwrap_or(false),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    #[test]
    fn test_locales_are_tracked_independently() {
        let cache = NegativeCache::new();
        let match_id = id("sr:match:1");
        let en = Locale::new("en");
        let de = Locale::new("de");

        cache.mark_missing(&match_id, &en);
        assert!(cache.is_known_missing(&match_id, &en));
        assert!(!cache.is_known_missing(&match_id, &de));
        assert!(cache.is_known_missing_anywhere(&match_id));
        assert!(!cache.is_known_missing(&id("sr:match:2"), &en));
    }

    #[test]
    fn test_first_seen_is_kept() {
        let cache = NegativeCache::new();
        let match_id = id("sr:match:1");
        let en = Locale::new("en");

        cache.mark_missing(&match_id, &en);
        let first = cache.first_seen(&match_id, &en).unwrap();
        cache.mark_missing(&match_id, &en);
        assert_eq!(cache.first_seen(&match_id, &en), Some(first));
    }

    #[test]
    fn test_clear_removes_all_locales() {
        let cache = NegativeCache::new();
        let match_id = id("sr:match:1");
        cache.mark_missing(&match_id, &Locale::new("en"));
        cache.mark_missing(&match_id, &Locale::new("de"));

        assert!(cache.clear(&match_id));
        assert!(!cache.is_known_missing(&match_id, &Locale::new("en")));
        assert!(!cache.is_known_missing(&match_id, &Locale::new("de")));
        assert!(!cache.clear(&match_id));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_without_ttl_never_expire() {
        let cache = NegativeCache::new();
        cache.mark_missing(&id("sr:match:1"), &Locale::new("en"));
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entries_are_ignored_and_purged() {
        let cache = NegativeCache::with_ttl(Some(Duration::from_millis(1)));
        let match_id = id("sr:match:1");
        let en = Locale::new("en");
        cache.mark_missing(&match_id, &en);
        std::thread::sleep(Duration::from_millis(5));

        assert!(!cache.is_known_missing(&match_id, &en));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
