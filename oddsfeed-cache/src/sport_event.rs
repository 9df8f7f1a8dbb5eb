//! Sport event cache: matches, stages, tournaments and seasons.
//!
//! Summaries are fetched per `(id, locale)` through the data router and merged
//! into one [`EventItem`] per id. Tournament and season references embedded in
//! a summary are merged as well, and every DTO obtained is published so the
//! profile and sport data caches fill themselves from it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use oddsfeed_core::{
    CacheConfig, DataRouter, Dto, DtoKind, EntityId, ExceptionStrategy, FetchError, FetchResult,
    ListingDto, ListingKind, Locale, OddsfeedError, OddsfeedResult, SportEventSummaryDto,
    SummaryDto, TournamentInfoDto,
};
use tokio::runtime::Handle;

use crate::coordinator::{CacheCoordinator, CacheSubscriber};
use crate::fetch::{self, FetchPlan};
use crate::item::{CacheItem, EventItem};
use crate::keyed_lock::KeyedLock;
use crate::merge::MergeFrom;
use crate::negative::NegativeCache;
use crate::store::ItemStore;

const NAME: &str = "sport_event_cache";

const KINDS: &[DtoKind] = &[
    DtoKind::MatchSummary,
    DtoKind::Fixture,
    DtoKind::SportEventListing,
    DtoKind::TournamentInfo,
    DtoKind::TournamentListing,
];

/// Cache of sport events, tournaments and seasons.
pub struct SportEventCache {
    router: Arc<dyn DataRouter>,
    coordinator: Arc<CacheCoordinator>,
    items: ItemStore<EventItem>,
    /// Summary misses.
    negative: NegativeCache,
    fixture_negative: NegativeCache,
    schedule_negative: NegativeCache,
    /// Event ids per (tournament, locale).
    schedules: DashMap<(EntityId, Locale), Vec<EntityId>>,
    locks: KeyedLock,
    strategy: ExceptionStrategy,
    default_locales: Vec<Locale>,
    ttl: Duration,
    runtime: Option<Handle>,
}

impl SportEventCache {
    /// Create the cache. Register it with `coordinator` before first use.
    pub fn new(
        config: &CacheConfig,
        router: Arc<dyn DataRouter>,
        coordinator: Arc<CacheCoordinator>,
    ) -> Self {
        Self {
            router,
            coordinator,
            items: ItemStore::new(),
            negative: NegativeCache::with_ttl(config.negative_ttl),
            fixture_negative: NegativeCache::with_ttl(config.negative_ttl),
            schedule_negative: NegativeCache::with_ttl(config.negative_ttl),
            schedules: DashMap::new(),
            locks: KeyedLock::new(config.lock_pool_size, config.exception_strategy),
            strategy: config.exception_strategy,
            default_locales: config.default_locales.clone(),
            ttl: config.event_ttl,
            runtime: Handle::try_current().ok(),
        }
    }

    fn plan<'a>(&'a self, negative: &'a NegativeCache) -> FetchPlan<'a, EventItem> {
        FetchPlan {
            cache: NAME,
            store: &self.items,
            locks: &self.locks,
            negative,
            strategy: self.strategy,
        }
    }

    fn wanted(&self, locales: &[Locale]) -> Vec<Locale> {
        if locales.is_empty() {
            self.default_locales.clone()
        } else {
            locales.to_vec()
        }
    }

    // ========================================================================
    // GET OR FETCH
    // ========================================================================

    /// The event, tournament or season `id`, complete for `locales`.
    ///
    /// An empty `locales` means the configured default locales.
    pub async fn get_or_fetch(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<EventItem>> {
        let wanted = self.wanted(locales);
        self.plan(&self.negative)
            .get_or_fetch(
                id.as_str(),
                id,
                &wanted,
                |item, wanted| item.missing_locales(wanted),
                |locale| self.fetch_summary(id, locale),
            )
            .await
    }

    /// The event `id` with its fixture merged for `locales`.
    pub async fn get_fixture(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<EventItem>> {
        let wanted = self.wanted(locales);
        let lock_key = format!("fixture:{id}");
        self.plan(&self.fixture_negative)
            .get_or_fetch(
                &lock_key,
                id,
                &wanted,
                |item, wanted| item.missing_fixture_locales(wanted),
                |locale| self.fetch_fixture(id, locale),
            )
            .await
    }

    /// Blocking form of [`get_or_fetch`](Self::get_or_fetch).
    pub fn get_or_fetch_blocking(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<EventItem>> {
        fetch::block_on(self.runtime.as_ref(), self.get_or_fetch(id, locales))?
    }

    /// Blocking form of [`get_fixture`](Self::get_fixture).
    pub fn get_fixture_blocking(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<EventItem>> {
        fetch::block_on(self.runtime.as_ref(), self.get_fixture(id, locales))?
    }

    async fn fetch_summary(&self, id: &EntityId, locale: Locale) -> FetchResult<()> {
        let summary = self.router.fetch_summary(id, &locale).await?;
        ensure_id(id, summary.id(), &locale)?;
        let kind = match &summary {
            SummaryDto::SportEvent(_) => DtoKind::MatchSummary,
            SummaryDto::Tournament(_) => DtoKind::TournamentInfo,
        };
        let dto = Dto::from(summary);
        self.merge_dto(kind, &dto, &locale);
        self.coordinator.publish_from(NAME, kind, id, &dto, &locale);
        Ok(())
    }

    async fn fetch_fixture(&self, id: &EntityId, locale: Locale) -> FetchResult<()> {
        let fixture = self.router.fetch_fixture(id, &locale).await?;
        ensure_id(id, &fixture.summary.id, &locale)?;
        let dto = Dto::Fixture(fixture);
        self.merge_dto(DtoKind::Fixture, &dto, &locale);
        self.coordinator.publish_from(NAME, DtoKind::Fixture, id, &dto, &locale);
        Ok(())
    }

    // ========================================================================
    // TOURNAMENT SCHEDULES
    // ========================================================================

    /// Ids of the sport events scheduled in `tournament_id`.
    ///
    /// The listing is fetched once per (tournament, locale) and memoized until
    /// the tournament is invalidated. Listed events are merged without
    /// completing any locale.
    pub async fn fetch_ids_for(&self, tournament_id: &EntityId, locale: &Locale) -> OddsfeedResult<Vec<EntityId>> {
        let memo_key = (tournament_id.clone(), locale.clone());
        if let Some(ids) = self.schedules.get(&memo_key) {
            return Ok(ids.value().clone());
        }

        let _guard = self
            .locks
            .acquire(&format!("schedule:{tournament_id}:{locale}"))
            .await?;
        if let Some(ids) = self.schedules.get(&memo_key) {
            return Ok(ids.value().clone());
        }
        if self.schedule_negative.is_known_missing(tournament_id, locale) {
            return self.schedule_failure(FetchError::NotFound {
                id: tournament_id.clone(),
                locale: locale.clone(),
            });
        }

        let listing = ListingKind::TournamentSchedule(tournament_id.clone());
        tracing::debug!(cache = NAME, tournament_id = %tournament_id, locale = %locale, "Fetching schedule");
        let entries = match self.router.fetch_bulk_listing(&listing, locale).await {
            Ok(entries) => entries,
            Err(err) => {
                if err.is_not_found() {
                    self.schedule_negative.mark_missing(tournament_id, locale);
                }
                return self.schedule_failure(err);
            }
        };

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let (kind, dto) = match entry {
                ListingDto::SportEvent(summary) => (DtoKind::SportEventListing, Dto::SportEvent(summary)),
                ListingDto::Tournament(info) => (DtoKind::TournamentListing, Dto::Tournament(info)),
                ListingDto::Sport(_) => continue,
            };
            let id = dto.id().clone();
            self.merge_dto(kind, &dto, locale);
            self.coordinator.publish_from(NAME, kind, &id, &dto, locale);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        tracing::debug!(cache = NAME, tournament_id = %tournament_id, events = ids.len(), "Schedule cached");
        self.schedules.insert(memo_key, ids.clone());
        Ok(ids)
    }

    /// Blocking form of [`fetch_ids_for`](Self::fetch_ids_for).
    pub fn fetch_ids_for_blocking(&self, tournament_id: &EntityId, locale: &Locale) -> OddsfeedResult<Vec<EntityId>> {
        fetch::block_on(self.runtime.as_ref(), self.fetch_ids_for(tournament_id, locale))?
    }

    fn schedule_failure(&self, err: FetchError) -> OddsfeedResult<Vec<EntityId>> {
        match self.strategy {
            ExceptionStrategy::Propagate => Err(OddsfeedError::Fetch(err)),
            ExceptionStrategy::Suppress => {
                if !err.is_not_found() {
                    tracing::warn!(cache = NAME, error = %err, "Schedule fetch failed");
                }
                Ok(Vec::new())
            }
        }
    }

    // ========================================================================
    // MERGING
    // ========================================================================

    fn merge_dto(&self, kind: DtoKind, dto: &Dto, locale: &Locale) {
        match dto {
            Dto::SportEvent(summary) => {
                self.items
                    .upsert(&summary.id, |item| item.merge_from(summary, locale, kind));
                self.merge_references(summary, locale, kind);
            }
            Dto::Fixture(fixture) => {
                self.items
                    .upsert(&fixture.summary.id, |item| item.merge_from(fixture, locale, kind));
                self.merge_references(&fixture.summary, locale, kind);
            }
            Dto::Tournament(info) => self.merge_tournament(info, locale, kind),
            Dto::Sport(_) | Dto::Competitor(_) | Dto::Player(_) => {}
        }
    }

    fn merge_references(&self, summary: &SportEventSummaryDto, locale: &Locale, kind: DtoKind) {
        if let Some(tournament) = &summary.tournament {
            self.items
                .upsert(&tournament.id, |item| item.merge_from(tournament, locale, kind));
        }
        if let Some(season) = &summary.season {
            self.items
                .upsert(&season.id, |item| item.merge_from(season, locale, kind));
        }
    }

    fn merge_tournament(&self, info: &TournamentInfoDto, locale: &Locale, kind: DtoKind) {
        self.items
            .upsert(&info.id, |item| item.merge_from(info, locale, kind));
        if let Some(season) = &info.current_season {
            self.items
                .upsert(&season.id, |item| item.merge_from(season, locale, kind));
        }
    }

    // ========================================================================
    // STORE ACCESS
    // ========================================================================

    /// Cached item for `id`, without fetching.
    pub fn get(&self, id: &EntityId) -> Option<Arc<EventItem>> {
        self.items.get(id)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn keys(&self) -> Vec<EntityId> {
        self.items.keys()
    }

    /// Whether `id` is recorded as absent for `locale`.
    pub fn is_known_missing(&self, id: &EntityId, locale: &Locale) -> bool {
        self.negative.is_known_missing(id, locale)
    }

    /// Drop the item, its negative entries and any memoized schedule of `id`.
    pub fn invalidate(&self, id: &EntityId) -> bool {
        let removed = self.items.remove(id).is_some();
        let missed = self.negative.clear(id) | self.fixture_negative.clear(id);
        let scheduled = self.schedule_negative.clear(id);
        let before = self.schedules.len();
        self.schedules.retain(|(tournament, _), _| tournament != id);
        let memo = self.schedules.len() != before;
        if removed || missed || scheduled || memo {
            tracing::debug!(cache = NAME, id = %id, "Invalidated");
        }
        removed || missed || scheduled || memo
    }

    /// Drop items idle for longer than the configured TTL and expired negatives.
    pub fn purge_idle(&self) -> usize {
        self.negative.purge_expired();
        self.fixture_negative.purge_expired();
        self.schedule_negative.purge_expired();
        self.items.purge_idle(self.ttl)
    }

    pub(crate) fn store(&self) -> &ItemStore<EventItem> {
        &self.items
    }

    /// Forget negative entries for ids restored from an export.
    pub(crate) fn clear_negative(&self, id: &EntityId) {
        self.negative.clear(id);
        self.fixture_negative.clear(id);
    }
}

impl CacheSubscriber for SportEventCache {
    fn name(&self) -> &'static str {
        NAME
    }

    fn dto_kinds(&self) -> &'static [DtoKind] {
        KINDS
    }

    fn cache_dto(&self, kind: DtoKind, _id: &EntityId, dto: &Dto, locale: &Locale) {
        self.merge_dto(kind, dto, locale);
    }

    fn invalidate(&self, id: &EntityId) -> bool {
        SportEventCache::invalidate(self, id)
    }

    fn census(&self) -> BTreeMap<String, usize> {
        self.items.census()
    }
}

impl std::fmt::Debug for SportEventCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SportEventCache")
            .field("items", &self.items.len())
            .field("schedules", &self.schedules.len())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Reject a payload describing a different entity than the one requested.
pub(crate) fn ensure_id(requested: &EntityId, received: &EntityId, locale: &Locale) -> FetchResult<()> {
    if requested == received {
        return Ok(());
    }
    Err(FetchError::Mapping {
        id: requested.clone(),
        locale: locale.clone(),
        reason: format!("payload describes {received}"),
    })
}
