//! Sport data cache: sports, categories and the tournament hierarchy.
//!
//! Sports and categories are preloaded from the bulk listings once per
//! locale and refreshed periodically. Bulk loads are serialized under
//! [`BULK_KEY`], so overlapping refresh triggers share one round of listing
//! calls.
//!
//! A tournament missing from the bulk listing is resolved through its
//! summary. The result, including a confirmed miss, is remembered as a
//! special tournament so the summary is requested at most once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use oddsfeed_core::{
    CacheConfig, CacheError, CategoryRefDto, DataRouter, Dto, DtoKind, EntityId,
    ExceptionStrategy, FetchError, FetchResult, ListingDto, ListingKind, Locale, OddsfeedError,
    OddsfeedResult, SportDto, SportRefDto, SummaryDto,
};
use tokio::runtime::Handle;

use crate::coordinator::{CacheCoordinator, CacheSubscriber};
use crate::fetch::{self, FetchPlan};
use crate::item::{CacheItem, CategoryItem, SportItem};
use crate::keyed_lock::{KeyedLock, BULK_KEY};
use crate::merge::{self, MergeFrom};
use crate::negative::NegativeCache;
use crate::sport_event::ensure_id;
use crate::store::ItemStore;

const NAME: &str = "sport_data_cache";

const KINDS: &[DtoKind] = &[
    DtoKind::MatchSummary,
    DtoKind::Fixture,
    DtoKind::SportEventListing,
    DtoKind::TournamentInfo,
    DtoKind::TournamentListing,
    DtoKind::SportListing,
];

/// Cache of sports and categories.
pub struct SportDataCache {
    router: Arc<dyn DataRouter>,
    coordinator: Arc<CacheCoordinator>,
    sports: ItemStore<SportItem>,
    categories: ItemStore<CategoryItem>,
    /// Tournament → owning category.
    tournament_categories: DashMap<EntityId, EntityId>,
    /// Tournaments resolved outside the bulk listing. `None` marks a
    /// tournament confirmed absent.
    special_tournaments: DashMap<EntityId, Option<EntityId>>,
    loaded_locales: RwLock<BTreeSet<Locale>>,
    last_refresh: Mutex<Option<Instant>>,
    negative: NegativeCache,
    locks: KeyedLock,
    strategy: ExceptionStrategy,
    default_locales: Vec<Locale>,
    runtime: Option<Handle>,
}

impl SportDataCache {
    /// Create the cache. Register it with `coordinator` before first use.
    pub fn new(
        config: &CacheConfig,
        router: Arc<dyn DataRouter>,
        coordinator: Arc<CacheCoordinator>,
    ) -> Self {
        Self {
            router,
            coordinator,
            sports: ItemStore::new(),
            categories: ItemStore::new(),
            tournament_categories: DashMap::new(),
            special_tournaments: DashMap::new(),
            loaded_locales: RwLock::new(BTreeSet::new()),
            last_refresh: Mutex::new(None),
            negative: NegativeCache::with_ttl(config.negative_ttl),
            locks: KeyedLock::new(config.lock_pool_size, config.exception_strategy),
            strategy: config.exception_strategy,
            default_locales: config.default_locales.clone(),
            runtime: Handle::try_current().ok(),
        }
    }

    fn wanted(&self, locales: &[Locale]) -> Vec<Locale> {
        if locales.is_empty() {
            self.default_locales.clone()
        } else {
            locales.to_vec()
        }
    }

    fn unloaded(&self, wanted: &[Locale]) -> Vec<Locale> {
        let loaded = self
            .loaded_locales
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        crate::item::missing_from(Some(&*loaded), wanted)
    }

    // ========================================================================
    // BULK LOADING
    // ========================================================================

    /// Load the sport and tournament listings for every locale in `locales`
    /// not loaded yet.
    pub async fn load_all(&self, locales: &[Locale]) -> OddsfeedResult<()> {
        let wanted = self.wanted(locales);
        if self.unloaded(&wanted).is_empty() {
            return Ok(());
        }

        let guard = self.locks.acquire(BULK_KEY).await?;
        let pending = self.unloaded(&wanted);
        if pending.is_empty() {
            return Ok(());
        }
        let failures = self.load_locales(&pending).await;
        drop(guard);
        self.settle_failures(failures, "load")
    }

    /// Reload every loaded locale (and the defaults).
    ///
    /// A refresh that finds another one completed after it was requested
    /// returns without fetching. Returns the number of locales reloaded.
    pub async fn refresh(&self) -> OddsfeedResult<usize> {
        let requested = Instant::now();
        let guard = self.locks.acquire(BULK_KEY).await?;
        if self.refreshed_since(requested) {
            tracing::debug!(cache = NAME, "Refresh already completed by a concurrent caller");
            return Ok(0);
        }

        let mut locales: Vec<Locale> = self
            .loaded_locales
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        for locale in &self.default_locales {
            if !locales.contains(locale) {
                locales.push(locale.clone());
            }
        }
        self.negative.purge_expired();

        let failures = self.load_locales(&locales).await;
        drop(guard);
        let reloaded = locales.len() - failures.len().min(locales.len());
        tracing::info!(cache = NAME, locales = reloaded, failed = failures.len(), "Sport data refreshed");
        self.settle_failures(failures, "refresh").map(|()| reloaded)
    }

    /// Blocking form of [`refresh`](Self::refresh).
    pub fn refresh_blocking(&self) -> OddsfeedResult<usize> {
        fetch::block_on(self.runtime.as_ref(), self.refresh())?
    }

    /// When the last bulk load finished, if any.
    pub fn last_refresh(&self) -> Option<Instant> {
        *self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refreshed_since(&self, instant: Instant) -> bool {
        matches!(self.last_refresh(), Some(done) if done > instant)
    }

    /// Must be called with [`BULK_KEY`] held.
    async fn load_locales(&self, locales: &[Locale]) -> Vec<FetchError> {
        let mut failures = Vec::new();
        for locale in locales {
            match self.load_locale(locale).await {
                Ok(()) => {
                    self.loaded_locales
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(locale.clone());
                }
                Err(err) => failures.push(err),
            }
        }
        *self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        failures
    }

    async fn load_locale(&self, locale: &Locale) -> FetchResult<()> {
        tracing::debug!(cache = NAME, locale = %locale, "Loading sport listings");
        let sports = self.router.fetch_bulk_listing(&ListingKind::Sports, locale).await?;
        let tournaments = self
            .router
            .fetch_bulk_listing(&ListingKind::AllTournaments, locale)
            .await?;

        let mut sport_count = 0;
        for entry in sports {
            if let ListingDto::Sport(sport) = entry {
                let id = sport.id.clone();
                let dto = Dto::Sport(sport);
                self.merge_dto(DtoKind::SportListing, &dto, locale);
                self.coordinator.publish_from(NAME, DtoKind::SportListing, &id, &dto, locale);
                sport_count += 1;
            }
        }
        let mut tournament_count = 0;
        for entry in tournaments {
            if let ListingDto::Tournament(info) = entry {
                let id = info.id.clone();
                let dto = Dto::Tournament(info);
                self.merge_dto(DtoKind::TournamentListing, &dto, locale);
                self.coordinator
                    .publish_from(NAME, DtoKind::TournamentListing, &id, &dto, locale);
                tournament_count += 1;
            }
        }

        tracing::debug!(
            cache = NAME,
            locale = %locale,
            sports = sport_count,
            tournaments = tournament_count,
            "Sport listings loaded"
        );
        Ok(())
    }

    fn settle_failures(&self, mut failures: Vec<FetchError>, operation: &'static str) -> OddsfeedResult<()> {
        if failures.is_empty() {
            return Ok(());
        }
        match self.strategy {
            ExceptionStrategy::Propagate if failures.len() == 1 => {
                Err(OddsfeedError::Fetch(failures.remove(0)))
            }
            ExceptionStrategy::Propagate => Err(OddsfeedError::Cache(CacheError::FetchFailed {
                id: failures[0].id().clone(),
                failures,
            })),
            ExceptionStrategy::Suppress => {
                for failure in &failures {
                    tracing::warn!(cache = NAME, operation, error = %failure, "Sport data fetch failed");
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    /// Every sport, loading the listings for `locales` first.
    pub async fn get_sports(&self, locales: &[Locale]) -> OddsfeedResult<Vec<Arc<SportItem>>> {
        self.load_all(locales).await?;
        Ok(self.sports.snapshot())
    }

    /// The sport `id` complete for `locales`, or `None` when the feed does not
    /// know it.
    ///
    /// Sports absent from the bulk listing are fetched through their category
    /// listing.
    pub async fn get_sport(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Option<Arc<SportItem>>> {
        let wanted = self.wanted(locales);
        let plan = FetchPlan {
            cache: NAME,
            store: &self.sports,
            locks: &self.locks,
            negative: &self.negative,
            strategy: self.strategy,
        };
        let item = plan
            .get_or_fetch(
                id.as_str(),
                id,
                &wanted,
                |item, wanted| item.missing_locales(wanted),
                |locale| self.fetch_sport_categories(id, locale),
            )
            .await?;
        Ok(Some(item).filter(|item| !item.is_placeholder()))
    }

    /// Blocking form of [`get_sport`](Self::get_sport).
    pub fn get_sport_blocking(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Option<Arc<SportItem>>> {
        fetch::block_on(self.runtime.as_ref(), self.get_sport(id, locales))?
    }

    async fn fetch_sport_categories(&self, id: &EntityId, locale: Locale) -> FetchResult<()> {
        let listing = ListingKind::SportCategories(id.clone());
        let entries = self.router.fetch_bulk_listing(&listing, &locale).await?;
        let sport = entries
            .into_iter()
            .find_map(|entry| match entry {
                ListingDto::Sport(sport) => Some(sport),
                _ => None,
            })
            .ok_or_else(|| FetchError::NotFound {
                id: id.clone(),
                locale: locale.clone(),
            })?;
        ensure_id(id, &sport.id, &locale)?;
        let dto = Dto::Sport(sport);
        self.merge_dto(DtoKind::SportListing, &dto, &locale);
        self.coordinator
            .publish_from(NAME, DtoKind::SportListing, id, &dto, &locale);
        Ok(())
    }

    /// The category `id`, loading the listings for `locales` first.
    pub async fn get_category(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Option<Arc<CategoryItem>>> {
        self.load_all(locales).await?;
        Ok(self.categories.get(id))
    }

    /// The sport owning `tournament_id`.
    ///
    /// Tournaments outside the bulk listing are resolved once through their
    /// summary. A tournament the feed does not know is remembered as absent
    /// and answered with `None` without further I/O until invalidated.
    pub async fn get_sport_for_tournament(
        &self,
        tournament_id: &EntityId,
        locales: &[Locale],
    ) -> OddsfeedResult<Option<Arc<SportItem>>> {
        let wanted = self.wanted(locales);
        self.load_all(&wanted).await?;
        if let Some(resolved) = self.resolve_known(tournament_id) {
            return Ok(resolved);
        }

        let guard = self.locks.acquire(&format!("special:{tournament_id}")).await?;
        if let Some(resolved) = self.resolve_known(tournament_id) {
            return Ok(resolved);
        }

        let mut failures = Vec::new();
        for locale in &wanted {
            if self.special_named_for(tournament_id, &wanted) {
                break;
            }
            let outcome = fetch::fetch_locales(
                NAME,
                &self.negative,
                tournament_id,
                std::slice::from_ref(locale),
                |locale| self.fetch_special(tournament_id, locale),
            )
            .await;
            failures.extend(outcome);
        }
        if !self.special_tournaments.contains_key(tournament_id)
            && !failures.is_empty()
            && failures.iter().all(FetchError::is_not_found)
        {
            tracing::debug!(cache = NAME, tournament_id = %tournament_id, "Unknown tournament recorded");
            self.special_tournaments.insert(tournament_id.clone(), None);
        }
        drop(guard);

        let resolved = self.resolve_known(tournament_id).flatten();
        let failures = failures.into_iter().filter(|f| !f.is_not_found()).collect();
        self.settle_failures(failures, "tournament lookup").map(|()| resolved)
    }

    /// Blocking form of [`get_sport_for_tournament`](Self::get_sport_for_tournament).
    pub fn get_sport_for_tournament_blocking(
        &self,
        tournament_id: &EntityId,
        locales: &[Locale],
    ) -> OddsfeedResult<Option<Arc<SportItem>>> {
        fetch::block_on(
            self.runtime.as_ref(),
            self.get_sport_for_tournament(tournament_id, locales),
        )?
    }

    /// `Some(answer)` when the owning sport of `tournament_id` is already
    /// known, including a remembered absence.
    fn resolve_known(&self, tournament_id: &EntityId) -> Option<Option<Arc<SportItem>>> {
        if let Some(sport_id) = self.sport_id_for(tournament_id) {
            return Some(self.sports.get(&sport_id));
        }
        let special = self.special_tournaments.get(tournament_id)?;
        Some(special.value().as_ref().and_then(|sport_id| self.sports.get(sport_id)))
    }

    /// Whether a special tournament already points at a sport named in
    /// every `wanted` locale, so further summaries add nothing.
    fn special_named_for(&self, tournament_id: &EntityId, wanted: &[Locale]) -> bool {
        let sport_id = match self.special_tournaments.get(tournament_id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        sport_id
            .and_then(|sport_id| self.sports.peek(&sport_id))
            .is_some_and(|sport| wanted.iter().all(|locale| sport.names.contains_key(locale)))
    }

    fn sport_id_for(&self, tournament_id: &EntityId) -> Option<EntityId> {
        let category_id = self.tournament_categories.get(tournament_id)?;
        self.categories.peek(category_id.value())?.sport_id.clone()
    }

    async fn fetch_special(&self, tournament_id: &EntityId, locale: Locale) -> FetchResult<()> {
        let summary = self.router.fetch_summary(tournament_id, &locale).await?;
        ensure_id(tournament_id, summary.id(), &locale)?;
        let SummaryDto::Tournament(info) = summary else {
            return Err(FetchError::Mapping {
                id: tournament_id.clone(),
                locale,
                reason: "summary is not a tournament".to_string(),
            });
        };
        let sport_id = info.sport.as_ref().map(|sport| sport.id.clone());
        let dto = Dto::Tournament(info);
        self.merge_dto(DtoKind::TournamentInfo, &dto, &locale);
        self.special_tournaments.insert(tournament_id.clone(), sport_id);
        self.coordinator
            .publish_from(NAME, DtoKind::TournamentInfo, tournament_id, &dto, &locale);
        Ok(())
    }

    /// Tournaments listed under `category_id`, from cached data only.
    pub fn get_tournament_ids(&self, category_id: &EntityId) -> Vec<EntityId> {
        self.categories
            .get(category_id)
            .map(|category| category.tournament_ids.clone())
            .unwrap_or_default()
    }

    // ========================================================================
    // MERGING
    // ========================================================================

    fn merge_dto(&self, kind: DtoKind, dto: &Dto, locale: &Locale) {
        match dto {
            Dto::Sport(sport) => self.merge_sport(sport, locale, kind),
            Dto::Tournament(info) => self.merge_hierarchy(
                &info.id,
                info.sport.as_ref(),
                info.category.as_ref(),
                locale,
                kind,
            ),
            Dto::SportEvent(_) | Dto::Fixture(_) => {
                let Some(tournament) = dto.event_summary().and_then(|s| s.tournament.as_ref()) else {
                    return;
                };
                self.merge_hierarchy(
                    &tournament.id,
                    tournament.sport.as_ref(),
                    tournament.category.as_ref(),
                    locale,
                    kind,
                );
            }
            Dto::Competitor(_) | Dto::Player(_) => {}
        }
    }

    fn merge_sport(&self, sport: &SportDto, locale: &Locale, kind: DtoKind) {
        self.sports
            .upsert(&sport.id, |item| item.merge_from(sport, locale, kind));
        for category in sport.categories.iter().flatten() {
            self.categories.upsert(&category.id, |item| {
                item.merge_listed(category, &sport.id, locale, kind)
            });
            for tournament in category.tournaments.iter().flatten() {
                self.tournament_categories
                    .insert(tournament.id.clone(), category.id.clone());
            }
        }
    }

    /// Record the sport and category a tournament hangs under.
    fn merge_hierarchy(
        &self,
        tournament_id: &EntityId,
        sport: Option<&SportRefDto>,
        category: Option<&CategoryRefDto>,
        locale: &Locale,
        kind: DtoKind,
    ) {
        if let Some(sport) = sport {
            self.sports.upsert(&sport.id, |item| {
                item.merge_from(sport, locale, kind);
                if let Some(category) = category {
                    merge::union_ids(&mut item.category_ids, [&category.id]);
                }
            });
        }
        if let Some(category) = category {
            self.categories.upsert(&category.id, |item| {
                item.merge_from(category, locale, kind);
                if let Some(sport) = sport {
                    merge::scalar(&mut item.sport_id, Some(sport.id.clone()));
                }
                merge::union_ids(&mut item.tournament_ids, [tournament_id]);
            });
            self.tournament_categories
                .insert(tournament_id.clone(), category.id.clone());
        }
    }

    // ========================================================================
    // STORE ACCESS
    // ========================================================================

    /// Cached sport, without fetching.
    pub fn sport(&self, id: &EntityId) -> Option<Arc<SportItem>> {
        self.sports.get(id)
    }

    /// Cached category, without fetching.
    pub fn category(&self, id: &EntityId) -> Option<Arc<CategoryItem>> {
        self.categories.get(id)
    }

    pub fn count(&self) -> usize {
        self.sports.len() + self.categories.len()
    }

    /// Sport and category ids, sorted.
    pub fn keys(&self) -> Vec<EntityId> {
        let mut keys = self.sports.keys();
        keys.extend(self.categories.keys());
        keys.sort();
        keys
    }

    pub fn loaded_locales(&self) -> BTreeSet<Locale> {
        self.loaded_locales
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_known_missing(&self, id: &EntityId, locale: &Locale) -> bool {
        self.negative.is_known_missing(id, locale)
    }

    /// Drop `id` as a sport, category or tournament, with its negative
    /// entries and special-tournament record.
    pub fn invalidate(&self, id: &EntityId) -> bool {
        let sport = self.sports.remove(id).is_some();
        let category = self.categories.remove(id).is_some();
        let tournament = self.tournament_categories.remove(id).is_some();
        let special = self.special_tournaments.remove(id).is_some();
        let missed = self.negative.clear(id);
        let removed = sport || category || tournament || special || missed;
        if removed {
            tracing::debug!(cache = NAME, id = %id, "Invalidated");
        }
        removed
    }

    pub(crate) fn sport_store(&self) -> &ItemStore<SportItem> {
        &self.sports
    }

    pub(crate) fn category_store(&self) -> &ItemStore<CategoryItem> {
        &self.categories
    }

    /// Rebuild the tournament index for an imported category.
    pub(crate) fn restore_category(&self, item: CategoryItem) {
        self.negative.clear(&item.id);
        for tournament_id in &item.tournament_ids {
            self.tournament_categories
                .insert(tournament_id.clone(), item.id.clone());
        }
        self.categories.insert(item);
    }

    pub(crate) fn clear_negative(&self, id: &EntityId) {
        self.negative.clear(id);
    }
}

impl CacheSubscriber for SportDataCache {
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
        SportDataCache::invalidate(self, id)
    }

    fn census(&self) -> BTreeMap<String, usize> {
        let mut census = self.sports.census();
        for (kind, count) in self.categories.census() {
            *census.entry(kind).or_insert(0) += count;
        }
        census
    }
}

impl std::fmt::Debug for SportDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SportDataCache")
            .field("sports", &self.sports.len())
            .field("categories", &self.categories.len())
            .field("special_tournaments", &self.special_tournaments.len())
            .finish()
    }
}
