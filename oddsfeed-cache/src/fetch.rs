//! The get-or-fetch protocol shared by the entity caches.
//!
//! The keyed lock for the id is held while locales are fetched. Each locale
//! is attempted independently; a failure for one never stops the others.

use std::future::Future;
use std::sync::Arc;

use oddsfeed_core::{
    CacheError, EntityId, ExceptionStrategy, FetchError, FetchResult, Locale, OddsfeedError,
    OddsfeedResult,
};
use tokio::runtime::Handle;

use crate::item::{missing_from, CacheItem};
use crate::keyed_lock::KeyedLock;
use crate::negative::NegativeCache;
use crate::store::ItemStore;

/// The pieces of one cache taking part in a get-or-fetch round.
pub(crate) struct FetchPlan<'a, T> {
    pub cache: &'static str,
    pub store: &'a ItemStore<T>,
    pub locks: &'a KeyedLock,
    pub negative: &'a NegativeCache,
    pub strategy: ExceptionStrategy,
}

impl<T: CacheItem> FetchPlan<'_, T> {
    /// Return the item for `id` complete for `wanted`, fetching what is missing.
    ///
    /// `missing` names the locales an item still lacks; `fetch_one` fetches
    /// and merges a single locale. An item already complete is returned
    /// without locking. Otherwise the keyed lock for `lock_key` is taken and
    /// the missing set recomputed, so concurrent callers share one fetch per
    /// locale.
    pub(crate) async fn get_or_fetch<M, F, Fut>(
        &self,
        lock_key: &str,
        id: &EntityId,
        wanted: &[Locale],
        missing: M,
        fetch_one: F,
    ) -> OddsfeedResult<Arc<T>>
    where
        M: Fn(&T, &[Locale]) -> Vec<Locale>,
        F: FnMut(Locale) -> Fut,
        Fut: Future<Output = FetchResult<()>>,
    {
        if let Some(item) = self.store.get(id) {
            if missing(item.as_ref(), wanted).is_empty() {
                return Ok(item);
            }
        }

        let guard = self.locks.acquire(lock_key).await?;
        let current = self.store.peek(id);
        let pending = match &current {
            Some(item) => missing(item.as_ref(), wanted),
            None => missing_from(None, wanted),
        };
        if pending.is_empty() {
            drop(guard);
            return Ok(self.store.get(id).or(current).unwrap_or_else(|| Arc::new(T::new(id.clone()))));
        }

        let failures = fetch_locales(self.cache, self.negative, id, &pending, fetch_one).await;
        drop(guard);
        settle(self.cache, self.strategy, id, self.store.get(id), failures)
    }
}

/// Fetch every locale in `locales` for `id` through `fetch_one`.
///
/// Locales already known missing are skipped without I/O and reported as
/// [`FetchError::NotFound`]. A fresh `NotFound` is recorded in `negative`;
/// any other failure is not.
pub(crate) async fn fetch_locales<F, Fut>(
    cache: &'static str,
    negative: &NegativeCache,
    id: &EntityId,
    locales: &[Locale],
    mut fetch_one: F,
) -> Vec<FetchError>
where
    F: FnMut(Locale) -> Fut,
    Fut: Future<Output = FetchResult<()>>,
{
    let mut failures = Vec::new();
    for locale in locales {
        if negative.is_known_missing(id, locale) {
            tracing::trace!(cache, id = %id, locale = %locale, "Known missing, skipping fetch");
            failures.push(FetchError::NotFound {
                id: id.clone(),
                locale: locale.clone(),
            });
            continue;
        }

        tracing::debug!(cache, id = %id, locale = %locale, "Fetching");
        match fetch_one(locale.clone()).await {
            Ok(()) => {
                tracing::debug!(cache, id = %id, locale = %locale, "Fetched and merged");
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!(cache, id = %id, locale = %locale, "Not found, recording miss");
                negative.mark_missing(id, locale);
                failures.push(err);
            }
            Err(err) => failures.push(err),
        }
    }
    failures
}

/// Turn the outcome of a fetch round into the caller's result.
///
/// Under [`ExceptionStrategy::Suppress`] failures are logged and the stored
/// item (or an empty, unstored placeholder) is returned.
pub(crate) fn settle<T: CacheItem>(
    cache: &'static str,
    strategy: ExceptionStrategy,
    id: &EntityId,
    item: Option<Arc<T>>,
    mut failures: Vec<FetchError>,
) -> OddsfeedResult<Arc<T>> {
    if failures.is_empty() {
        return Ok(item.unwrap_or_else(|| Arc::new(T::new(id.clone()))));
    }

    match strategy {
        ExceptionStrategy::Propagate => {
            if failures.len() == 1 {
                Err(OddsfeedError::Fetch(failures.remove(0)))
            } else {
                Err(OddsfeedError::Cache(CacheError::FetchFailed {
                    id: id.clone(),
                    failures,
                }))
            }
        }
        ExceptionStrategy::Suppress => {
            for failure in &failures {
                if failure.is_not_found() {
                    tracing::debug!(cache, id = %id, locale = %failure.locale(), "Entity absent for locale");
                } else {
                    tracing::warn!(cache, id = %id, error = %failure, "Fetch failed, returning cached data");
                }
            }
            Ok(item.unwrap_or_else(|| Arc::new(T::new(id.clone()))))
        }
    }
}

/// Drive `future` to completion on the runtime captured at construction.
///
/// Must not be called from a runtime worker thread; use
/// `tokio::task::spawn_blocking` there.
pub(crate) fn block_on<F: Future>(runtime: Option<&Handle>, future: F) -> OddsfeedResult<F::Output> {
    let handle = runtime.ok_or(CacheError::NoRuntime)?;
    Ok(handle.block_on(future))
}
