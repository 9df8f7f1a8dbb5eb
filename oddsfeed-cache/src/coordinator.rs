//! Cache coordinator: fan-out of DTOs and invalidations to registered caches.
//!
//! Caches register as [`CacheSubscriber`]s for a set of [`DtoKind`]s. A DTO
//! obtained anywhere (a fetch of a containing entity, an external producer)
//! is published once and merged synchronously by every interested cache
//! before `publish` returns.
//!
//! The coordinator holds weak references, so a cache that keeps the
//! coordinator alive does not form a cycle with it.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use oddsfeed_core::{Dto, DtoKind, EntityId, Locale};

/// A cache that accepts published DTOs.
pub trait CacheSubscriber: Send + Sync {
    /// Stable name, used in logs and to skip the publishing cache.
    fn name(&self) -> &'static str;

    /// DTO kinds this cache merges.
    fn dto_kinds(&self) -> &'static [DtoKind];

    /// Merge a published DTO. Must not block on I/O.
    fn cache_dto(&self, kind: DtoKind, id: &EntityId, dto: &Dto, locale: &Locale);

    /// Drop everything held for `id`. Returns whether anything was removed.
    fn invalidate(&self, id: &EntityId) -> bool;

    /// Item count per entity kind name.
    fn census(&self) -> BTreeMap<String, usize>;
}

/// Registry of caches and the broadcast point between them.
#[derive(Default)]
pub struct CacheCoordinator {
    subscribers: RwLock<Vec<Weak<dyn CacheSubscriber>>>,
}

impl CacheCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache. Registering the same cache twice is a no-op.
    pub fn register(&self, subscriber: &Arc<dyn CacheSubscriber>) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let weak = Arc::downgrade(subscriber);
        if subscribers.iter().any(|existing| existing.ptr_eq(&weak)) {
            return;
        }
        subscribers.retain(|existing| existing.strong_count() > 0);
        tracing::debug!(
            cache = subscriber.name(),
            kinds = ?subscriber.dto_kinds(),
            "Cache registered with coordinator"
        );
        subscribers.push(weak);
    }

    /// Live subscribers, collected so no lock is held while they run.
    fn live(&self) -> Vec<Arc<dyn CacheSubscriber>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.live().len()
    }

    /// Deliver `dto` to every cache subscribed to `kind`.
    ///
    /// Returns the number of caches that received it; zero is not an error.
    pub fn publish(&self, kind: DtoKind, id: &EntityId, dto: &Dto, locale: &Locale) -> usize {
        self.deliver(None, kind, id, dto, locale)
    }

    /// Like [`publish`](Self::publish), skipping the cache named `origin`,
    /// which has already merged the DTO itself.
    pub fn publish_from(
        &self,
        origin: &str,
        kind: DtoKind,
        id: &EntityId,
        dto: &Dto,
        locale: &Locale,
    ) -> usize {
        self.deliver(Some(origin), kind, id, dto, locale)
    }

    fn deliver(
        &self,
        origin: Option<&str>,
        kind: DtoKind,
        id: &EntityId,
        dto: &Dto,
        locale: &Locale,
    ) -> usize {
        let mut delivered = 0;
        for subscriber in self.live() {
            if Some(subscriber.name()) == origin || !subscriber.dto_kinds().contains(&kind) {
                continue;
            }
            subscriber.cache_dto(kind, id, dto, locale);
            delivered += 1;
        }
        if delivered == 0 {
            tracing::trace!(kind = %kind, id = %id, "Publication reached no subscriber");
        }
        delivered
    }

    /// Invalidate `id` in every registered cache. Returns the number of caches
    /// that held something for it.
    pub fn invalidate(&self, id: &EntityId) -> usize {
        let removed = self
            .live()
            .iter()
            .filter(|subscriber| subscriber.invalidate(id))
            .count();
        tracing::debug!(id = %id, caches = removed, "Invalidated");
        removed
    }

    /// Invalidate `id` only in caches subscribed to `kind`.
    pub fn invalidate_kind(&self, id: &EntityId, kind: DtoKind) -> usize {
        self.live()
            .iter()
            .filter(|subscriber| subscriber.dto_kinds().contains(&kind))
            .filter(|subscriber| subscriber.invalidate(id))
            .count()
    }

    /// Combined census of every registered cache.
    pub fn status(&self) -> BTreeMap<String, usize> {
        let mut status = BTreeMap::new();
        for subscriber in self.live() {
            for (kind, count) in subscriber.census() {
                *status.entry(kind).or_insert(0) += count;
            }
        }
        status
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
