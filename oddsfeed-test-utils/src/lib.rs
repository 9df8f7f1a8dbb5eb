//! ODDSFEED Test Utilities
//!
//! Centralized test infrastructure for the oddsfeed workspace:
//! - An in-memory data router with call counters
//! - Proptest generators for DTOs
//! - Test fixtures for common feed payloads
//! - Custom assertions for oddsfeed errors

pub use oddsfeed_core::{
    CategoryDto, CategoryRefDto, CompetitorProfileDto, DataRouter, EntityId, FetchError,
    FetchResult, FixtureDto, GroupDto, ListingDto, ListingKind, Locale, OddsfeedError,
    OddsfeedResult, PlayerProfileDto, ProfileDto, RoundDto, SeasonRefDto, SportDto,
    SportEventSummaryDto, SportRefDto, SummaryDto, TeamCompetitorDto, Timestamp,
    TournamentInfoDto, TournamentRefDto, VenueDto,
};

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;

/// Install a test-friendly tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK DATA ROUTER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Endpoint {
    Summary,
    Fixture,
    Profile,
    Listing,
}

/// In-memory [`DataRouter`] serving canned DTOs per `(id, locale)`.
///
/// Anything not registered answers [`FetchError::NotFound`], except the
/// store-wide listings which answer an empty list. Every call is
/// counted before any configured latency, so concurrent callers that reach
/// the router are all visible in the counters.
#[derive(Debug, Default)]
pub struct MockDataRouter {
    summaries: DashMap<(EntityId, Locale), SummaryDto>,
    fixtures: DashMap<(EntityId, Locale), FixtureDto>,
    profiles: DashMap<(EntityId, Locale), ProfileDto>,
    listings: DashMap<(ListingKind, Locale), Vec<ListingDto>>,
    failures: DashMap<(EntityId, Locale), String>,
    listing_failures: DashMap<(ListingKind, Locale), FetchError>,
    calls: DashMap<(Endpoint, String, Locale), usize>,
    latency: Option<Duration>,
}

impl MockDataRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Serve `summary` for its own id.
    pub fn add_summary(&self, locale: &Locale, summary: SummaryDto) {
        let id = summary.id().clone();
        self.add_summary_for(&id, locale, summary);
    }

    /// Serve `summary` when `id` is requested, whatever id the payload carries.
    pub fn add_summary_for(&self, id: &EntityId, locale: &Locale, summary: SummaryDto) {
        self.summaries.insert((id.clone(), locale.clone()), summary);
    }

    pub fn add_fixture(&self, locale: &Locale, fixture: FixtureDto) {
        self.fixtures
            .insert((fixture.summary.id.clone(), locale.clone()), fixture);
    }

    pub fn add_profile(&self, locale: &Locale, profile: ProfileDto) {
        self.profiles
            .insert((profile.id().clone(), locale.clone()), profile);
    }

    pub fn add_listing(&self, kind: ListingKind, locale: &Locale, entries: Vec<ListingDto>) {
        self.listings.insert((kind, locale.clone()), entries);
    }

    /// Fail every fetch of `id` in `locale` with a communication error.
    pub fn fail(&self, id: &EntityId, locale: &Locale, reason: &str) {
        self.failures
            .insert((id.clone(), locale.clone()), reason.to_string());
    }

    /// Answer every request for the `kind` listing in `locale` with `error`.
    pub fn fail_listing(&self, kind: ListingKind, locale: &Locale, error: FetchError) {
        self.listing_failures.insert((kind, locale.clone()), error);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
        self.listing_failures.clear();
    }

    pub fn summary_calls(&self, id: &EntityId, locale: &Locale) -> usize {
        self.count(Endpoint::Summary, id.as_str(), locale)
    }

    pub fn fixture_calls(&self, id: &EntityId, locale: &Locale) -> usize {
        self.count(Endpoint::Fixture, id.as_str(), locale)
    }

    pub fn profile_calls(&self, id: &EntityId, locale: &Locale) -> usize {
        self.count(Endpoint::Profile, id.as_str(), locale)
    }

    pub fn listing_calls(&self, kind: &ListingKind, locale: &Locale) -> usize {
        self.count(Endpoint::Listing, &kind.to_string(), locale)
    }

    /// Calls of any kind, for any id and locale.
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    fn count(&self, endpoint: Endpoint, key: &str, locale: &Locale) -> usize {
        self.calls
            .get(&(endpoint, key.to_string(), locale.clone()))
            .map(|count| *count)
            .unwrap_or(0)
    }

    async fn record(&self, endpoint: Endpoint, key: String, locale: &Locale) {
        *self.calls.entry((endpoint, key, locale.clone())).or_insert(0) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_failure(&self, id: &EntityId, locale: &Locale) -> FetchResult<()> {
        match self.failures.get(&(id.clone(), locale.clone())) {
            Some(reason) => Err(FetchError::Communication {
                id: id.clone(),
                locale: locale.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn lookup<T: Clone>(
        map: &DashMap<(EntityId, Locale), T>,
        id: &EntityId,
        locale: &Locale,
    ) -> FetchResult<T> {
        map.get(&(id.clone(), locale.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FetchError::NotFound {
                id: id.clone(),
                locale: locale.clone(),
            })
    }
}

#[async_trait]
impl DataRouter for MockDataRouter {
    async fn fetch_summary(&self, id: &EntityId, locale: &Locale) -> FetchResult<SummaryDto> {
        self.record(Endpoint::Summary, id.to_string(), locale).await;
        self.check_failure(id, locale)?;
        Self::lookup(&self.summaries, id, locale)
    }

    async fn fetch_fixture(&self, id: &EntityId, locale: &Locale) -> FetchResult<FixtureDto> {
        self.record(Endpoint::Fixture, id.to_string(), locale).await;
        self.check_failure(id, locale)?;
        Self::lookup(&self.fixtures, id, locale)
    }

    async fn fetch_profile(&self, id: &EntityId, locale: &Locale) -> FetchResult<ProfileDto> {
        self.record(Endpoint::Profile, id.to_string(), locale).await;
        self.check_failure(id, locale)?;
        Self::lookup(&self.profiles, id, locale)
    }

    async fn fetch_bulk_listing(
        &self,
        kind: &ListingKind,
        locale: &Locale,
    ) -> FetchResult<Vec<ListingDto>> {
        self.record(Endpoint::Listing, kind.to_string(), locale).await;
        let key = (kind.clone(), locale.clone());
        if let Some(error) = self.listing_failures.get(&key) {
            return Err(error.value().clone());
        }
        match kind {
            ListingKind::TournamentSchedule(id) | ListingKind::SportCategories(id) => {
                self.check_failure(id, locale)?;
                self.listings
                    .get(&key)
                    .map(|entries| entries.value().clone())
                    .ok_or_else(|| FetchError::NotFound {
                        id: id.clone(),
                        locale: locale.clone(),
                    })
            }
            ListingKind::Sports | ListingKind::AllTournaments => Ok(self
                .listings
                .get(&key)
                .map(|entries| entries.value().clone())
                .unwrap_or_default()),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for feed DTOs.

    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// One of a small fixed set of locales, so generated merges collide.
    pub fn arb_locale() -> impl Strategy<Value = Locale> {
        prop::sample::select(vec!["en", "de", "fr", "pt-br"]).prop_map(Locale::new)
    }

    /// A timestamp in the 2023-2025 range, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_672_531_200i64..1_767_225_600i64)
            .prop_filter_map("out of chrono range", |secs| {
                chrono::DateTime::from_timestamp(secs, 0)
            })
    }

    fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,8}( [A-Z][a-z]{2,8})?"
    }

    pub fn arb_team_competitor() -> impl Strategy<Value = TeamCompetitorDto> {
        (
            1u64..20,
            arb_name(),
            proptest::option::of(prop::sample::select(vec!["home", "away"])),
        )
            .prop_map(|(n, name, qualifier)| {
                let mut dto = fixtures::competitor_dto(n, &name);
                dto.qualifier = qualifier.map(str::to_string);
                dto
            })
    }

    pub fn arb_round() -> impl Strategy<Value = RoundDto> {
        (
            proptest::option::of(prop::sample::select(vec!["group", "cup"])),
            proptest::option::of(1u32..38),
            proptest::option::of(arb_name()),
        )
            .prop_map(|(kind, number, name)| RoundDto {
                kind: kind.map(str::to_string),
                number,
                name,
                group: None,
            })
    }

    /// A match summary for `sr:match:{n}`; every optional field may be absent.
    pub fn arb_summary_dto(n: u64) -> impl Strategy<Value = SportEventSummaryDto> {
        (
            proptest::option::of(arb_name()),
            proptest::option::of(arb_timestamp()),
            proptest::option::of(any::<bool>()),
            proptest::option::of((1u64..4).prop_map(|t| fixtures::tournament_ref(t, "Cup"))),
            proptest::option::of(proptest::collection::vec(arb_team_competitor(), 0..4)),
            proptest::option::of(prop::sample::select(vec!["not_started", "live", "closed"])),
            proptest::option::of(arb_round()),
        )
            .prop_map(
                move |(name, scheduled, tbd, tournament, competitors, status, round)| {
                    let mut dto = SportEventSummaryDto::bare(fixtures::match_id(n));
                    dto.name = name;
                    dto.scheduled = scheduled;
                    dto.start_time_tbd = tbd;
                    dto.tournament = tournament;
                    dto.competitors = competitors;
                    dto.status = status.map(str::to_string);
                    dto.round = round;
                    dto
                },
            )
    }

    /// Groups with distinct ids `g0`..`g5`, optional names and up to four
    /// members each.
    pub fn arb_identified_groups() -> impl Strategy<Value = Vec<GroupDto>> {
        proptest::collection::vec(
            (
                0u8..6,
                proptest::option::of("[A-C]"),
                proptest::collection::vec(1u64..8, 0..5),
            ),
            0..4,
        )
        .prop_map(|raw| {
            let mut seen = BTreeSet::new();
            raw.into_iter()
                .filter(|(id, _, _)| seen.insert(*id))
                .map(|(id, name, members)| {
                    fixtures::group_dto(Some(&format!("g{id}")), name.as_deref(), &members)
                })
                .collect()
        })
    }

    /// Tournament info for `sr:tournament:{n}`.
    pub fn arb_tournament_info_dto(n: u64) -> impl Strategy<Value = TournamentInfoDto> {
        (
            arb_name(),
            proptest::option::of(arb_identified_groups()),
            proptest::option::of(proptest::collection::vec(arb_team_competitor(), 0..4)),
            proptest::option::of((1u64..3).prop_map(move |s| fixtures::season_ref(s, "Season", n))),
            proptest::option::of("20[0-9]{2}"),
        )
            .prop_map(move |(name, groups, competitors, season, year)| {
                let mut dto = fixtures::tournament_info(n, &name, groups);
                dto.competitors = competitors;
                dto.current_season = season;
                dto.year = year;
                dto
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built feed payloads.
    //!
    //! Numbering convention: match `n` is played by competitors `n*10+1`
    //! (home) and `n*10+2` (away) in tournament 1, sport 1, category 1.

    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::BTreeMap;

    /// Parse a fixture id.
    pub fn eid(raw: &str) -> EntityId {
        EntityId::parse(raw).expect("Invalid fixture id")
    }

    pub fn match_id(n: u64) -> EntityId {
        eid(&format!("sr:match:{n}"))
    }

    pub fn competitor_id(n: u64) -> EntityId {
        eid(&format!("sr:competitor:{n}"))
    }

    pub fn tournament_id(n: u64) -> EntityId {
        eid(&format!("sr:tournament:{n}"))
    }

    pub fn season_id(n: u64) -> EntityId {
        eid(&format!("sr:season:{n}"))
    }

    pub fn player_id(n: u64) -> EntityId {
        eid(&format!("sr:player:{n}"))
    }

    pub fn sport_id(n: u64) -> EntityId {
        eid(&format!("sr:sport:{n}"))
    }

    pub fn category_id(n: u64) -> EntityId {
        eid(&format!("sr:category:{n}"))
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("Invalid fixture date")
    }

    /// Competitor `n`; the abbreviation is the first three letters of the
    /// name, upper-cased.
    pub fn competitor_dto(n: u64, name: &str) -> TeamCompetitorDto {
        TeamCompetitorDto {
            id: competitor_id(n),
            name: name.to_string(),
            abbreviation: Some(name.chars().take(3).collect::<String>().to_uppercase()),
            country: None,
            country_code: None,
            gender: None,
            qualifier: None,
        }
    }

    pub fn sport_ref(n: u64, name: &str) -> SportRefDto {
        SportRefDto {
            id: sport_id(n),
            name: name.to_string(),
        }
    }

    pub fn category_ref(n: u64, name: &str) -> CategoryRefDto {
        CategoryRefDto {
            id: category_id(n),
            name: name.to_string(),
            country_code: None,
        }
    }

    /// Tournament `n` under sport 1 / category 1.
    pub fn tournament_ref(n: u64, name: &str) -> TournamentRefDto {
        TournamentRefDto {
            id: tournament_id(n),
            name: name.to_string(),
            sport: Some(sport_ref(1, "Soccer")),
            category: Some(category_ref(1, "England")),
        }
    }

    pub fn season_ref(n: u64, name: &str, tournament_n: u64) -> SeasonRefDto {
        SeasonRefDto {
            id: season_id(n),
            name: name.to_string(),
            year: Some("2024".to_string()),
            start_date: Some(date(2024, 8, 16)),
            end_date: Some(date(2025, 5, 25)),
            tournament_id: Some(tournament_id(tournament_n)),
        }
    }

    /// Match `n` between "Home n" and "Away n" in tournament 1.
    pub fn match_summary(n: u64, name: &str) -> SportEventSummaryDto {
        let mut home = competitor_dto(n * 10 + 1, &format!("Home {n}"));
        home.qualifier = Some("home".to_string());
        let mut away = competitor_dto(n * 10 + 2, &format!("Away {n}"));
        away.qualifier = Some("away".to_string());

        SportEventSummaryDto {
            id: match_id(n),
            name: Some(name.to_string()),
            scheduled: Utc.with_ymd_and_hms(2024, 8, 17, 14, 0, 0).single(),
            scheduled_end: None,
            start_time_tbd: Some(false),
            tournament: Some(tournament_ref(1, "Premier League")),
            season: None,
            venue: Some(VenueDto {
                id: eid("sr:venue:1"),
                name: "Main Stadium".to_string(),
                city: Some("London".to_string()),
                country: Some("England".to_string()),
                capacity: Some(60_000),
                coordinates: None,
            }),
            competitors: Some(vec![home, away]),
            status: Some("not_started".to_string()),
            round: Some(RoundDto {
                kind: Some("group".to_string()),
                number: Some(1),
                name: None,
                group: None,
            }),
            stage_type: None,
            parent_id: None,
            child_ids: None,
        }
    }

    pub fn fixture_dto(summary: SportEventSummaryDto) -> FixtureDto {
        let mut reference_ids = BTreeMap::new();
        reference_ids.insert("betradar".to_string(), summary.id.number().to_string());
        FixtureDto {
            summary,
            start_time_confirmed: Some(true),
            reference_ids,
            extra_info: BTreeMap::new(),
            tv_channels: vec!["Sky Sports".to_string()],
        }
    }

    /// A group whose members are named "Team {n}".
    pub fn group_dto(id: Option<&str>, name: Option<&str>, members: &[u64]) -> GroupDto {
        GroupDto {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            competitors: members
                .iter()
                .map(|n| competitor_dto(*n, &format!("Team {n}")))
                .collect(),
        }
    }

    /// Tournament `n` under sport 1 / category 1, without root competitors.
    pub fn tournament_info(n: u64, name: &str, groups: Option<Vec<GroupDto>>) -> TournamentInfoDto {
        TournamentInfoDto {
            id: tournament_id(n),
            name: name.to_string(),
            sport: Some(sport_ref(1, "Soccer")),
            category: Some(category_ref(1, "England")),
            current_season: None,
            scheduled: None,
            scheduled_end: None,
            groups,
            competitors: None,
            year: None,
        }
    }

    pub fn player_dto(n: u64, name: &str, competitor: Option<u64>) -> PlayerProfileDto {
        PlayerProfileDto {
            id: player_id(n),
            name: name.to_string(),
            nationality: Some("England".to_string()),
            date_of_birth: Some(date(1996, 3, 1)),
            height: Some(185),
            weight: Some(80),
            player_type: Some("forward".to_string()),
            jersey_number: Some((n % 99) as u32 + 1),
            competitor_id: competitor.map(competitor_id),
        }
    }

    pub fn competitor_profile(n: u64, name: &str, players: Vec<PlayerProfileDto>) -> CompetitorProfileDto {
        CompetitorProfileDto {
            competitor: competitor_dto(n, name),
            players,
            venue: None,
            manager_name: Some(format!("Manager {n}")),
            jerseys: vec!["home".to_string(), "away".to_string()],
        }
    }

    pub fn sport_dto(n: u64, name: &str, categories: Vec<CategoryDto>) -> SportDto {
        SportDto {
            id: sport_id(n),
            name: name.to_string(),
            categories: Some(categories),
        }
    }

    /// Category `n` listing tournaments named "Tournament {t}".
    pub fn category_dto(n: u64, name: &str, tournaments: &[u64]) -> CategoryDto {
        CategoryDto {
            id: category_id(n),
            name: name.to_string(),
            country_code: None,
            tournaments: Some(
                tournaments
                    .iter()
                    .map(|t| tournament_ref(*t, &format!("Tournament {t}")))
                    .collect(),
            ),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for oddsfeed error shapes.

    use super::*;

    /// Assert that a result is a confirmed miss.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &OddsfeedResult<T>) {
        match result {
            Err(err) if err.is_not_found() => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    /// Assert that a result is a single communication failure.
    #[track_caller]
    pub fn assert_communication_error<T: std::fmt::Debug>(result: &OddsfeedResult<T>) {
        match result {
            Err(OddsfeedError::Fetch(FetchError::Communication { .. })) => {}
            other => panic!("Expected Communication error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_mock_router_counts_and_misses() {
        let router = MockDataRouter::new();
        let en = Locale::new("en");
        router.add_summary(&en, SummaryDto::SportEvent(match_summary(1, "A vs B")));

        assert!(router.fetch_summary(&match_id(1), &en).await.is_ok());
        let miss = router.fetch_summary(&match_id(2), &en).await.unwrap_err();
        assert!(miss.is_not_found());
        assert_eq!(router.summary_calls(&match_id(1), &en), 1);
        assert_eq!(router.total_calls(), 2);

        router.fail(&match_id(1), &en, "503");
        assert!(matches!(
            router.fetch_summary(&match_id(1), &en).await,
            Err(FetchError::Communication { .. })
        ));
    }

    #[tokio::test]
    async fn test_listing_answers_and_injected_failures() {
        let router = MockDataRouter::new();
        let en = Locale::new("en");

        assert!(router.fetch_bulk_listing(&ListingKind::Sports, &en).await.unwrap().is_empty());
        let schedule = ListingKind::TournamentSchedule(tournament_id(1));
        assert!(router.fetch_bulk_listing(&schedule, &en).await.unwrap_err().is_not_found());

        let outage = FetchError::Communication {
            id: sport_id(1),
            locale: en.clone(),
            reason: "503".to_string(),
        };
        router.fail_listing(ListingKind::Sports, &en, outage.clone());
        assert_eq!(
            router.fetch_bulk_listing(&ListingKind::Sports, &en).await.unwrap_err(),
            outage
        );
        assert_eq!(router.listing_calls(&ListingKind::Sports, &en), 2);

        router.clear_failures();
        assert!(router.fetch_bulk_listing(&ListingKind::Sports, &en).await.is_ok());
    }

    #[test]
    fn test_fixture_conventions() {
        let summary = match_summary(3, "Home 3 vs Away 3");
        let competitors = summary.competitors.unwrap();
        assert_eq!(competitors[0].id, competitor_id(31));
        assert_eq!(competitors[1].qualifier.as_deref(), Some("away"));
        assert_eq!(competitor_dto(1, "Rovers").abbreviation.as_deref(), Some("ROV"));
    }
}
