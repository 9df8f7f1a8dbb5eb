//! Sport event items: matches, stages, tournaments and seasons.
//!
//! One item type with a common capability set (schedule, venue, competitors)
//! and a variant-specific [`EventDetail`] chosen from the id kind. The only
//! translatable field of an event is its name; the embedded venue tracks its
//! own translations.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use oddsfeed_core::{
    DtoKind, EntityId, EntityKind, FixtureDto, Locale, RoundDto, SeasonRefDto,
    SportEventSummaryDto, Timestamp, TournamentInfoDto, TournamentRefDto,
};
use serde::{Deserialize, Serialize};

use super::{merge_venue, CacheItem, Group, Translations, VenueData};
use crate::merge::{self, MergeFrom};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventItem {
    pub id: EntityId,
    /// Locales whose summary (or tournament info) has been merged.
    pub fetched_locales: BTreeSet<Locale>,
    /// Locales whose fixture has been merged.
    pub fixture_locales: BTreeSet<Locale>,
    pub names: Translations,
    pub scheduled: Option<Timestamp>,
    pub scheduled_end: Option<Timestamp>,
    pub start_time_tbd: Option<bool>,
    pub sport_id: Option<EntityId>,
    pub competitor_ids: Option<Vec<EntityId>>,
    pub venue: Option<VenueData>,
    pub fixture: Option<FixtureData>,
    pub detail: EventDetail,
}

/// Variant-specific event data, tagged by the kind of the item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum EventDetail {
    Match(MatchDetail),
    Stage(StageDetail),
    Tournament(TournamentDetail),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDetail {
    pub tournament_id: Option<EntityId>,
    pub season_id: Option<EntityId>,
    pub status: Option<String>,
    pub round: Option<RoundData>,
    /// Competitor id to `home` / `away`.
    pub qualifiers: BTreeMap<EntityId, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDetail {
    pub tournament_id: Option<EntityId>,
    pub parent_id: Option<EntityId>,
    pub child_ids: Option<Vec<EntityId>>,
    pub stage_type: Option<String>,
    pub status: Option<String>,
}

/// Shared by tournaments, simple tournaments and seasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentDetail {
    pub category_id: Option<EntityId>,
    pub current_season_id: Option<EntityId>,
    /// Seasons only: the tournament the season belongs to.
    pub tournament_id: Option<EntityId>,
    pub year: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    pub kind: Option<String>,
    pub number: Option<u32>,
    pub name: Option<String>,
    pub group: Option<String>,
}

impl From<&RoundDto> for RoundData {
    fn from(dto: &RoundDto) -> Self {
        Self {
            kind: dto.kind.clone(),
            number: dto.number,
            name: dto.name.clone(),
            group: dto.group.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureData {
    pub start_time_confirmed: Option<bool>,
    pub reference_ids: BTreeMap<String, String>,
    pub extra_info: BTreeMap<String, String>,
    pub tv_channels: Vec<String>,
}

impl EventItem {
    pub fn name(&self, locale: &Locale) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }

    pub fn is_tournament_like(&self) -> bool {
        matches!(self.detail, EventDetail::Tournament(_))
    }

    /// The owning tournament of a match, stage or season.
    pub fn tournament_id(&self) -> Option<&EntityId> {
        match &self.detail {
            EventDetail::Match(m) => m.tournament_id.as_ref(),
            EventDetail::Stage(s) => s.tournament_id.as_ref(),
            EventDetail::Tournament(t) => t.tournament_id.as_ref(),
        }
    }

    pub fn season_id(&self) -> Option<&EntityId> {
        match &self.detail {
            EventDetail::Match(m) => m.season_id.as_ref(),
            EventDetail::Tournament(t) => t.current_season_id.as_ref(),
            EventDetail::Stage(_) => None,
        }
    }

    pub fn category_id(&self) -> Option<&EntityId> {
        match &self.detail {
            EventDetail::Tournament(t) => t.category_id.as_ref(),
            _ => None,
        }
    }

    pub fn groups(&self) -> &[Group] {
        match &self.detail {
            EventDetail::Tournament(t) => &t.groups,
            _ => &[],
        }
    }

    /// Fixture locales missing from `wanted`.
    pub fn missing_fixture_locales(&self, wanted: &[Locale]) -> Vec<Locale> {
        super::missing_from(Some(&self.fixture_locales), wanted)
    }

    fn merge_summary(&mut self, dto: &SportEventSummaryDto, locale: &Locale, complete: bool) {
        if complete {
            merge::translation_complete(&mut self.names, locale, dto.name.as_deref());
        } else {
            merge::translation(&mut self.names, locale, dto.name.as_deref());
        }
        merge::scalar(&mut self.scheduled, dto.scheduled);
        merge::scalar(&mut self.scheduled_end, dto.scheduled_end);
        merge::scalar(&mut self.start_time_tbd, dto.start_time_tbd);
        merge::scalar(
            &mut self.sport_id,
            dto.tournament
                .as_ref()
                .and_then(|t| t.sport.as_ref())
                .map(|s| s.id.clone()),
        );
        if let Some(competitors) = &dto.competitors {
            self.competitor_ids = Some(merge::ordered_ids(competitors.iter().map(|c| &c.id)));
        }
        merge_venue(&mut self.venue, dto.venue.as_ref(), locale);

        let tournament_id = dto.tournament.as_ref().map(|t| t.id.clone());
        match &mut self.detail {
            EventDetail::Match(detail) => {
                merge::scalar(&mut detail.tournament_id, tournament_id);
                merge::scalar(&mut detail.season_id, dto.season.as_ref().map(|s| s.id.clone()));
                merge::scalar(&mut detail.status, dto.status.clone());
                merge::scalar(&mut detail.round, dto.round.as_ref().map(RoundData::from));
                for competitor in dto.competitors.iter().flatten() {
                    if let Some(qualifier) = &competitor.qualifier {
                        detail
                            .qualifiers
                            .insert(competitor.id.clone(), qualifier.clone());
                    }
                }
            }
            EventDetail::Stage(detail) => {
                merge::scalar(&mut detail.tournament_id, tournament_id);
                merge::scalar(&mut detail.parent_id, dto.parent_id.clone());
                merge::scalar(&mut detail.child_ids, dto.child_ids.clone());
                merge::scalar(&mut detail.stage_type, dto.stage_type.clone());
                merge::scalar(&mut detail.status, dto.status.clone());
            }
            EventDetail::Tournament(_) => {}
        }

        if complete {
            self.fetched_locales.insert(locale.clone());
        }
    }
}

impl CacheItem for EventItem {
    fn new(id: EntityId) -> Self {
        let detail = match id.kind() {
            EntityKind::Stage => EventDetail::Stage(StageDetail::default()),
            kind if kind.is_tournament_like() => EventDetail::Tournament(TournamentDetail::default()),
            _ => EventDetail::Match(MatchDetail::default()),
        };
        Self {
            id,
            fetched_locales: BTreeSet::new(),
            fixture_locales: BTreeSet::new(),
            names: Translations::new(),
            scheduled: None,
            scheduled_end: None,
            start_time_tbd: None,
            sport_id: None,
            competitor_ids: None,
            venue: None,
            fixture: None,
            detail,
        }
    }

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn fetched_locales(&self) -> &BTreeSet<Locale> {
        &self.fetched_locales
    }

    fn is_placeholder(&self) -> bool {
        *self == Self::new(self.id.clone())
    }
}

impl MergeFrom<SportEventSummaryDto> for EventItem {
    fn merge_from(&mut self, dto: &SportEventSummaryDto, locale: &Locale, kind: DtoKind) {
        self.merge_summary(dto, locale, kind.completes_locale());
    }
}

impl MergeFrom<FixtureDto> for EventItem {
    fn merge_from(&mut self, dto: &FixtureDto, locale: &Locale, _kind: DtoKind) {
        self.merge_summary(&dto.summary, locale, false);
        merge::translation_complete(&mut self.names, locale, dto.summary.name.as_deref());

        let fixture = self.fixture.get_or_insert_with(FixtureData::default);
        merge::scalar(&mut fixture.start_time_confirmed, dto.start_time_confirmed);
        fixture
            .reference_ids
            .extend(dto.reference_ids.iter().map(|(k, v)| (k.clone(), v.clone())));
        fixture
            .extra_info
            .extend(dto.extra_info.iter().map(|(k, v)| (k.clone(), v.clone())));
        if !dto.tv_channels.is_empty() {
            fixture.tv_channels = dto.tv_channels.clone();
        }
        self.fixture_locales.insert(locale.clone());
    }
}

impl MergeFrom<TournamentInfoDto> for EventItem {
    fn merge_from(&mut self, dto: &TournamentInfoDto, locale: &Locale, kind: DtoKind) {
        let complete = kind.completes_locale();
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        merge::scalar(&mut self.scheduled, dto.scheduled);
        merge::scalar(&mut self.scheduled_end, dto.scheduled_end);
        merge::scalar(&mut self.sport_id, dto.sport.as_ref().map(|s| s.id.clone()));

        let root = dto
            .competitors
            .as_ref()
            .map(|list| merge::ordered_ids(list.iter().map(|c| &c.id)));

        if let EventDetail::Tournament(detail) = &mut self.detail {
            merge::scalar(&mut detail.category_id, dto.category.as_ref().map(|c| c.id.clone()));
            merge::scalar(
                &mut detail.current_season_id,
                dto.current_season.as_ref().map(|s| s.id.clone()),
            );
            merge::scalar(&mut detail.year, dto.year.clone());

            // Listing entries carry no structure; only a full info reconciles groups.
            if complete {
                detail.groups = match &dto.groups {
                    Some(incoming) => merge::reconcile_groups(&detail.groups, incoming),
                    None => Vec::new(),
                };
            }
            if complete && dto.groups.as_ref().is_some_and(|g| !g.is_empty()) {
                self.competitor_ids = Some(merge::group_competitors(&detail.groups));
            } else if root.is_some() {
                self.competitor_ids = root;
            }
        } else if root.is_some() {
            self.competitor_ids = root;
        }

        if complete {
            self.fetched_locales.insert(locale.clone());
        }
    }
}

impl MergeFrom<TournamentRefDto> for EventItem {
    fn merge_from(&mut self, dto: &TournamentRefDto, locale: &Locale, _kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        merge::scalar(&mut self.sport_id, dto.sport.as_ref().map(|s| s.id.clone()));
        if let EventDetail::Tournament(detail) = &mut self.detail {
            merge::scalar(&mut detail.category_id, dto.category.as_ref().map(|c| c.id.clone()));
        }
    }
}

impl MergeFrom<SeasonRefDto> for EventItem {
    fn merge_from(&mut self, dto: &SeasonRefDto, locale: &Locale, _kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        if let EventDetail::Tournament(detail) = &mut self.detail {
            merge::scalar(&mut detail.year, dto.year.clone());
            merge::scalar(&mut detail.start_date, dto.start_date);
            merge::scalar(&mut detail.end_date, dto.end_date);
            merge::scalar(&mut detail.tournament_id, dto.tournament_id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merged;
    use oddsfeed_test_utils::fixtures::*;
    use oddsfeed_test_utils::generators;
    use proptest::prelude::*;

    fn en() -> Locale {
        Locale::new("en")
    }

    #[test]
    fn test_new_item_detail_follows_id_kind() {
        assert!(matches!(EventItem::new(match_id(1)).detail, EventDetail::Match(_)));
        assert!(matches!(
            EventItem::new(eid("sr:stage:5")).detail,
            EventDetail::Stage(_)
        ));
        assert!(EventItem::new(season_id(3)).is_tournament_like());
        assert!(EventItem::new(tournament_id(3)).is_placeholder());
    }

    #[test]
    fn test_venue_change_keeps_venue_text_for_fetched_locales() {
        let de = Locale::new("de");
        let mut item = EventItem::new(match_id(1));
        item.merge_from(&match_summary(1, "Home 1 vs Away 1"), &en(), DtoKind::MatchSummary);

        let mut moved = match_summary(1, "Heim 1 gegen Gast 1");
        if let Some(venue) = moved.venue.as_mut() {
            venue.id = eid("sr:venue:2");
            venue.name = "Neues Stadion".to_string();
        }
        item.merge_from(&moved, &de, DtoKind::MatchSummary);

        let venue = item.venue.as_ref().unwrap();
        assert_eq!(venue.id, eid("sr:venue:2"));
        for locale in &item.fetched_locales {
            assert!(venue.names.contains_key(locale), "no venue name for {locale}");
        }
        assert_eq!(venue.names.get(&de).map(String::as_str), Some("Neues Stadion"));
    }

    #[test]
    fn test_summary_merge_marks_locale_and_fills_detail() {
        let mut item = EventItem::new(match_id(1));
        item.merge_from(&match_summary(1, "Home 1 vs Away 1"), &en(), DtoKind::MatchSummary);

        assert!(item.fetched_locales.contains(&en()));
        assert_eq!(item.name(&en()), Some("Home 1 vs Away 1"));
        assert_eq!(item.tournament_id(), Some(&tournament_id(1)));
        assert_eq!(item.sport_id, Some(sport_id(1)));
        assert_eq!(item.competitor_ids.as_ref().map(Vec::len), Some(2));
        match &item.detail {
            EventDetail::Match(detail) => {
                assert_eq!(
                    detail.qualifiers.get(&competitor_id(11)).map(String::as_str),
                    Some("home")
                );
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn test_listing_merge_does_not_mark_locale() {
        let mut item = EventItem::new(match_id(1));
        item.merge_from(&match_summary(1, "A vs B"), &en(), DtoKind::SportEventListing);
        assert!(item.fetched_locales.is_empty());
        assert_eq!(item.name(&en()), Some("A vs B"));
    }

    #[test]
    fn test_summary_without_name_still_keeps_invariant() {
        let mut dto = match_summary(1, "unused");
        dto.name = None;
        let mut item = EventItem::new(match_id(1));
        item.merge_from(&dto, &en(), DtoKind::MatchSummary);
        assert!(item.fetched_locales.contains(&en()));
        assert_eq!(item.name(&en()), Some(""));
    }

    #[test]
    fn test_absent_scalars_never_erase() {
        let mut item = EventItem::new(match_id(1));
        item.merge_from(&match_summary(1, "A vs B"), &en(), DtoKind::MatchSummary);
        let scheduled = item.scheduled;
        assert!(scheduled.is_some());

        item.merge_from(
            &SportEventSummaryDto::bare(match_id(1)),
            &Locale::new("de"),
            DtoKind::MatchSummary,
        );
        assert_eq!(item.scheduled, scheduled);
        assert_eq!(item.tournament_id(), Some(&tournament_id(1)));
        assert_eq!(item.name(&en()), Some("A vs B"));
    }

    #[test]
    fn test_fixture_locales_are_tracked_separately() {
        let mut item = EventItem::new(match_id(1));
        item.merge_from(&fixture_dto(match_summary(1, "A vs B")), &en(), DtoKind::Fixture);

        assert!(item.fixture_locales.contains(&en()));
        assert!(item.fetched_locales.is_empty());
        let fixture = item.fixture.as_ref().unwrap();
        assert_eq!(fixture.start_time_confirmed, Some(true));
        assert_eq!(fixture.tv_channels, vec!["Sky Sports".to_string()]);
        assert!(item.missing_fixture_locales(&[en()]).is_empty());
    }

    #[test]
    fn test_group_membership_replaced_not_unioned() {
        let mut item = EventItem::new(tournament_id(7));
        let first = tournament_info(7, "Cup", Some(vec![group_dto(Some("1"), None, &[1, 2, 3])]));
        item.merge_from(&first, &en(), DtoKind::TournamentInfo);

        let second = tournament_info(7, "Cup", Some(vec![group_dto(Some("1"), None, &[1, 2])]));
        item.merge_from(&second, &en(), DtoKind::TournamentInfo);

        assert_eq!(item.groups().len(), 1);
        assert_eq!(
            item.groups()[0].competitor_ids,
            vec![competitor_id(1), competitor_id(2)]
        );
        assert_eq!(
            item.competitor_ids,
            Some(vec![competitor_id(1), competitor_id(2)])
        );
    }

    #[test]
    fn test_unmatched_group_added_and_root_list_is_union() {
        let mut item = EventItem::new(tournament_id(7));
        let first = tournament_info(7, "Cup", Some(vec![group_dto(Some("1"), None, &[1, 2, 3])]));
        item.merge_from(&first, &en(), DtoKind::TournamentInfo);

        let second = tournament_info(
            7,
            "Cup",
            Some(vec![
                group_dto(Some("1"), None, &[1, 2, 3]),
                group_dto(Some("2"), Some("X"), &[4]),
            ]),
        );
        item.merge_from(&second, &en(), DtoKind::TournamentInfo);

        assert_eq!(item.groups().len(), 2);
        assert_eq!(item.groups()[1].name.as_deref(), Some("X"));
        assert_eq!(
            item.competitor_ids,
            Some(vec![
                competitor_id(1),
                competitor_id(2),
                competitor_id(3),
                competitor_id(4)
            ])
        );
    }

    #[test]
    fn test_null_groups_clear_structure() {
        let mut item = EventItem::new(tournament_id(7));
        let first = tournament_info(7, "Cup", Some(vec![group_dto(Some("1"), None, &[1, 2])]));
        item.merge_from(&first, &en(), DtoKind::TournamentInfo);
        assert_eq!(item.groups().len(), 1);

        item.merge_from(&tournament_info(7, "Cup", None), &en(), DtoKind::TournamentInfo);
        assert!(item.groups().is_empty());
        // The root list is left as it was: the incoming info carried none.
        assert_eq!(
            item.competitor_ids,
            Some(vec![competitor_id(1), competitor_id(2)])
        );
    }

    #[test]
    fn test_root_competitors_kept_as_given_without_groups() {
        let mut dto = tournament_info(7, "Cup", None);
        dto.competitors = Some(vec![competitor_dto(9, "Nine"), competitor_dto(8, "Eight")]);
        let mut item = EventItem::new(tournament_id(7));
        item.merge_from(&dto, &en(), DtoKind::TournamentInfo);
        assert_eq!(
            item.competitor_ids,
            Some(vec![competitor_id(9), competitor_id(8)])
        );
    }

    #[test]
    fn test_tournament_listing_leaves_groups_alone() {
        let mut item = EventItem::new(tournament_id(7));
        let full = tournament_info(7, "Cup", Some(vec![group_dto(Some("1"), None, &[1])]));
        item.merge_from(&full, &en(), DtoKind::TournamentInfo);
        item.merge_from(
            &tournament_info(7, "Cup", None),
            &Locale::new("de"),
            DtoKind::TournamentListing,
        );
        assert_eq!(item.groups().len(), 1);
        assert!(!item.fetched_locales.contains(&Locale::new("de")));
    }

    #[test]
    fn test_season_ref_fills_tournament_detail() {
        let mut item = EventItem::new(season_id(2));
        let dto = season_ref(2, "Premier League 24/25", 1);
        item.merge_from(&dto, &en(), DtoKind::MatchSummary);
        assert_eq!(item.tournament_id(), Some(&tournament_id(1)));
        assert!(item.fetched_locales.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_summary_merge_is_idempotent(
            base in generators::arb_summary_dto(1),
            dto in generators::arb_summary_dto(1),
            locale in generators::arb_locale(),
        ) {
            let start = merged(&EventItem::new(match_id(1)), &base, &Locale::new("en"), DtoKind::MatchSummary);
            let once = merged(&start, &dto, &locale, DtoKind::MatchSummary);
            let twice = merged(&once, &dto, &locale, DtoKind::MatchSummary);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_tournament_merge_is_idempotent(
            base in generators::arb_tournament_info_dto(7),
            dto in generators::arb_tournament_info_dto(7),
            locale in generators::arb_locale(),
        ) {
            let start = merged(&EventItem::new(tournament_id(7)), &base, &Locale::new("en"), DtoKind::TournamentInfo);
            let once = merged(&start, &dto, &locale, DtoKind::TournamentInfo);
            let twice = merged(&once, &dto, &locale, DtoKind::TournamentInfo);
            prop_assert_eq!(once, twice);
        }

        /// A fetched locale always has a name entry.
        #[test]
        fn prop_fetched_locales_have_names(
            dtos in proptest::collection::vec((generators::arb_summary_dto(1), generators::arb_locale()), 1..6),
        ) {
            let mut item = EventItem::new(match_id(1));
            for (dto, locale) in &dtos {
                item.merge_from(dto, locale, DtoKind::MatchSummary);
            }
            for locale in &item.fetched_locales {
                prop_assert!(item.names.contains_key(locale));
            }
        }
    }
}
