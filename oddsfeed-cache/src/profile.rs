//! Profile cache: competitors and players.
//!
//! Most competitor data arrives as a side effect: every summary, fixture or
//! tournament info published through the coordinator carries competitors,
//! which are merged here for the publication locale. A competitor seen that
//! way is complete for the locale, so a later request only fetches the
//! locales still missing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use oddsfeed_core::{
    CacheConfig, CompetitorProfileDto, DataRouter, Dto, DtoKind, EntityId, ExceptionStrategy,
    FetchResult, Locale, OddsfeedResult, PlayerProfileDto, ProfileDto, TeamCompetitorDto,
};
use tokio::runtime::Handle;

use crate::coordinator::{CacheCoordinator, CacheSubscriber};
use crate::fetch::{self, FetchPlan};
use crate::item::{CacheItem, CompetitorItem, PlayerItem};
use crate::keyed_lock::KeyedLock;
use crate::merge::MergeFrom;
use crate::negative::NegativeCache;
use crate::sport_event::ensure_id;
use crate::store::ItemStore;

const NAME: &str = "profile_cache";

const KINDS: &[DtoKind] = &[
    DtoKind::MatchSummary,
    DtoKind::Fixture,
    DtoKind::SportEventListing,
    DtoKind::TournamentInfo,
    DtoKind::TournamentListing,
    DtoKind::CompetitorProfile,
    DtoKind::PlayerProfile,
];

/// Cache of competitor and player profiles.
pub struct ProfileCache {
    router: Arc<dyn DataRouter>,
    coordinator: Arc<CacheCoordinator>,
    competitors: ItemStore<CompetitorItem>,
    players: ItemStore<PlayerItem>,
    negative: NegativeCache,
    locks: KeyedLock,
    strategy: ExceptionStrategy,
    default_locales: Vec<Locale>,
    ttl: Duration,
    runtime: Option<Handle>,
}

impl ProfileCache {
    /// Create the cache. Register it with `coordinator` before first use.
    pub fn new(
        config: &CacheConfig,
        router: Arc<dyn DataRouter>,
        coordinator: Arc<CacheCoordinator>,
    ) -> Self {
        Self {
            router,
            coordinator,
            competitors: ItemStore::new(),
            players: ItemStore::new(),
            negative: NegativeCache::with_ttl(config.negative_ttl),
            locks: KeyedLock::new(config.lock_pool_size, config.exception_strategy),
            strategy: config.exception_strategy,
            default_locales: config.default_locales.clone(),
            ttl: config.profile_ttl,
            runtime: Handle::try_current().ok(),
        }
    }

    fn plan<'a, T>(&'a self, store: &'a ItemStore<T>) -> FetchPlan<'a, T> {
        FetchPlan {
            cache: NAME,
            store,
            locks: &self.locks,
            negative: &self.negative,
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

    /// The competitor `id`, complete for `locales`.
    ///
    /// Locales already obtained from summaries or group listings count as
    /// complete; only the others are fetched as profiles.
    pub async fn get_competitor(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<CompetitorItem>> {
        let wanted = self.wanted(locales);
        self.plan(&self.competitors)
            .get_or_fetch(
                id.as_str(),
                id,
                &wanted,
                |item, wanted| item.missing_locales(wanted),
                |locale| self.fetch_profile(id, locale),
            )
            .await
    }

    /// The competitor `id` with its full profile (players, venue, jerseys)
    /// merged for `locales`.
    pub async fn get_competitor_profile(
        &self,
        id: &EntityId,
        locales: &[Locale],
    ) -> OddsfeedResult<Arc<CompetitorItem>> {
        let wanted = self.wanted(locales);
        self.plan(&self.competitors)
            .get_or_fetch(
                id.as_str(),
                id,
                &wanted,
                |item, wanted| crate::item::missing_from(Some(&item.profile_locales), wanted),
                |locale| self.fetch_profile(id, locale),
            )
            .await
    }

    /// The player `id`, complete for `locales`.
    pub async fn get_player(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<PlayerItem>> {
        let wanted = self.wanted(locales);
        self.plan(&self.players)
            .get_or_fetch(
                id.as_str(),
                id,
                &wanted,
                |item, wanted| item.missing_locales(wanted),
                |locale| self.fetch_profile(id, locale),
            )
            .await
    }

    /// Blocking form of [`get_competitor`](Self::get_competitor).
    pub fn get_competitor_blocking(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<CompetitorItem>> {
        fetch::block_on(self.runtime.as_ref(), self.get_competitor(id, locales))?
    }

    /// Blocking form of [`get_player`](Self::get_player).
    pub fn get_player_blocking(&self, id: &EntityId, locales: &[Locale]) -> OddsfeedResult<Arc<PlayerItem>> {
        fetch::block_on(self.runtime.as_ref(), self.get_player(id, locales))?
    }

    async fn fetch_profile(&self, id: &EntityId, locale: Locale) -> FetchResult<()> {
        let profile = self.router.fetch_profile(id, &locale).await?;
        ensure_id(id, profile.id(), &locale)?;
        let kind = match &profile {
            ProfileDto::Competitor(_) => DtoKind::CompetitorProfile,
            ProfileDto::Player(_) => DtoKind::PlayerProfile,
        };
        let dto = Dto::from(profile);
        self.merge_dto(kind, &dto, &locale);
        self.coordinator.publish_from(NAME, kind, id, &dto, &locale);
        Ok(())
    }

    // ========================================================================
    // MERGING
    // ========================================================================

    fn merge_dto(&self, kind: DtoKind, dto: &Dto, locale: &Locale) {
        match dto {
            Dto::SportEvent(summary) => {
                self.merge_competitors(summary.competitors.iter().flatten(), locale, kind);
            }
            Dto::Fixture(fixture) => {
                self.merge_competitors(fixture.summary.competitors.iter().flatten(), locale, kind);
            }
            Dto::Tournament(info) => {
                let grouped = info.groups.iter().flatten().flat_map(|g| g.competitors.iter());
                self.merge_competitors(grouped, locale, kind);
                self.merge_competitors(info.competitors.iter().flatten(), locale, kind);
            }
            Dto::Competitor(profile) => self.merge_profile(profile, locale, kind),
            Dto::Player(player) => self.merge_player(player, locale, kind),
            Dto::Sport(_) => {}
        }
    }

    fn merge_competitors<'a>(
        &self,
        competitors: impl Iterator<Item = &'a TeamCompetitorDto>,
        locale: &Locale,
        kind: DtoKind,
    ) {
        for competitor in competitors {
            self.competitors
                .upsert(&competitor.id, |item| item.merge_from(competitor, locale, kind));
        }
    }

    fn merge_profile(&self, profile: &CompetitorProfileDto, locale: &Locale, kind: DtoKind) {
        self.competitors
            .upsert(&profile.competitor.id, |item| item.merge_from(profile, locale, kind));
        for player in &profile.players {
            self.merge_player(player, locale, kind);
        }
    }

    fn merge_player(&self, player: &PlayerProfileDto, locale: &Locale, kind: DtoKind) {
        self.players
            .upsert(&player.id, |item| item.merge_from(player, locale, kind));
    }

    // ========================================================================
    // STORE ACCESS
    // ========================================================================

    /// Cached competitor, without fetching.
    pub fn competitor(&self, id: &EntityId) -> Option<Arc<CompetitorItem>> {
        self.competitors.get(id)
    }

    /// Cached player, without fetching.
    pub fn player(&self, id: &EntityId) -> Option<Arc<PlayerItem>> {
        self.players.get(id)
    }

    pub fn count(&self) -> usize {
        self.competitors.len() + self.players.len()
    }

    /// Competitor and player ids, sorted.
    pub fn keys(&self) -> Vec<EntityId> {
        let mut keys = self.competitors.keys();
        keys.extend(self.players.keys());
        keys.sort();
        keys
    }

    pub fn is_known_missing(&self, id: &EntityId, locale: &Locale) -> bool {
        self.negative.is_known_missing(id, locale)
    }

    pub fn invalidate(&self, id: &EntityId) -> bool {
        let competitor = self.competitors.remove(id).is_some();
        let player = self.players.remove(id).is_some();
        let missed = self.negative.clear(id);
        if competitor || player || missed {
            tracing::debug!(cache = NAME, id = %id, "Invalidated");
        }
        competitor || player || missed
    }

    /// Drop profiles idle for longer than the configured TTL.
    pub fn purge_idle(&self) -> usize {
        self.negative.purge_expired();
        self.competitors.purge_idle(self.ttl) + self.players.purge_idle(self.ttl)
    }

    pub(crate) fn competitor_store(&self) -> &ItemStore<CompetitorItem> {
        &self.competitors
    }

    pub(crate) fn player_store(&self) -> &ItemStore<PlayerItem> {
        &self.players
    }

    pub(crate) fn clear_negative(&self, id: &EntityId) {
        self.negative.clear(id);
    }
}

impl CacheSubscriber for ProfileCache {
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
        ProfileCache::invalidate(self, id)
    }

    fn census(&self) -> BTreeMap<String, usize> {
        let mut census = self.competitors.census();
        for (kind, count) in self.players.census() {
            *census.entry(kind).or_insert(0) += count;
        }
        census
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("competitors", &self.competitors.len())
            .field("players", &self.players.len())
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsfeed_test_utils::fixtures::*;
    use oddsfeed_test_utils::MockDataRouter;

    fn cache_with(router: Arc<MockDataRouter>) -> ProfileCache {
        let config = CacheConfig::new().with_exception_strategy(ExceptionStrategy::Propagate);
        ProfileCache::new(&config, router, Arc::new(CacheCoordinator::new()))
    }

    #[tokio::test]
    async fn test_competitor_profile_fills_players() {
        let router = Arc::new(MockDataRouter::new());
        let en = Locale::new("en");
        router.add_profile(
            &en,
            ProfileDto::Competitor(competitor_profile(
                3,
                "Rovers",
                vec![player_dto(31, "Keeper", Some(3)), player_dto(32, "Striker", Some(3))],
            )),
        );
        let cache = cache_with(router.clone());

        let competitor = cache.get_competitor(&competitor_id(3), &[en.clone()]).await.unwrap();
        assert_eq!(competitor.player_ids.as_ref().map(Vec::len), Some(2));

        // Players arrived with the competitor profile.
        let player = cache.get_player(&player_id(31), &[en.clone()]).await.unwrap();
        assert_eq!(player.name(&en), Some("Keeper"));
        assert_eq!(router.profile_calls(&player_id(31), &en), 0);
        assert_eq!(cache.count(), 3);
    }

    #[tokio::test]
    async fn test_published_summary_populates_competitors() {
        let router = Arc::new(MockDataRouter::new());
        let en = Locale::new("en");
        let cache = cache_with(router.clone());

        let dto = Dto::SportEvent(match_summary(1, "Home 1 vs Away 1"));
        cache.cache_dto(DtoKind::MatchSummary, &match_id(1), &dto, &en);

        let home = cache.get_competitor(&competitor_id(11), &[en.clone()]).await.unwrap();
        assert_eq!(home.name(&en), Some("Home 1"));
        assert_eq!(router.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_profile_request_refetches_side_loaded_competitor() {
        let router = Arc::new(MockDataRouter::new());
        let en = Locale::new("en");
        router.add_profile(&en, ProfileDto::Competitor(competitor_profile(11, "Home 1", vec![])));
        let cache = cache_with(router.clone());

        let dto = Dto::SportEvent(match_summary(1, "Home 1 vs Away 1"));
        cache.cache_dto(DtoKind::MatchSummary, &match_id(1), &dto, &en);

        let item = cache.get_competitor_profile(&competitor_id(11), &[en.clone()]).await.unwrap();
        assert!(item.profile_locales.contains(&en));
        assert_eq!(router.profile_calls(&competitor_id(11), &en), 1);
    }

    #[tokio::test]
    async fn test_only_missing_locales_are_fetched() {
        let router = Arc::new(MockDataRouter::new());
        let en = Locale::new("en");
        let de = Locale::new("de");
        let fr = Locale::new("fr");
        router.add_profile(&de, ProfileDto::Competitor(competitor_profile(11, "Heim 1", vec![])));
        router.add_profile(&fr, ProfileDto::Competitor(competitor_profile(11, "Domicile 1", vec![])));
        let cache = cache_with(router.clone());

        let dto = Dto::SportEvent(match_summary(1, "Home 1 vs Away 1"));
        cache.cache_dto(DtoKind::MatchSummary, &match_id(1), &dto, &en);

        let item = cache
            .get_competitor(&competitor_id(11), &[en.clone(), de.clone(), fr.clone()])
            .await
            .unwrap();
        assert_eq!(router.profile_calls(&competitor_id(11), &en), 0);
        assert_eq!(router.profile_calls(&competitor_id(11), &de), 1);
        assert_eq!(router.profile_calls(&competitor_id(11), &fr), 1);
        assert_eq!(item.name(&en), Some("Home 1"));
        assert_eq!(item.name(&fr), Some("Domicile 1"));
        assert_eq!(item.fetched_locales.len(), 3);
    }

    #[tokio::test]
    async fn test_group_listing_does_not_complete_locale() {
        let router = Arc::new(MockDataRouter::new());
        let en = Locale::new("en");
        let cache = cache_with(router.clone());

        let info = tournament_info(7, "Cup", Some(vec![group_dto(Some("A"), None, &[1, 2])]));
        cache.cache_dto(DtoKind::TournamentListing, &tournament_id(7), &Dto::Tournament(info), &en);

        let item = cache.competitor(&competitor_id(1)).unwrap();
        assert!(item.fetched_locales.is_empty());
        assert_eq!(item.name(&en), Some("Team 1"));
    }

    #[tokio::test]
    async fn test_invalidate_clears_negative_entry() {
        let router = Arc::new(MockDataRouter::new());
        let en = Locale::new("en");
        let cache = cache_with(router.clone());

        assert!(cache.get_player(&player_id(5), &[en.clone()]).await.is_err());
        assert!(cache.is_known_missing(&player_id(5), &en));
        assert!(cache.invalidate(&player_id(5)));
        assert!(!cache.is_known_missing(&player_id(5), &en));
    }
}
