//! Competitor and player items.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use oddsfeed_core::{
    CompetitorProfileDto, DtoKind, EntityId, Locale, PlayerProfileDto, TeamCompetitorDto,
};
use serde::{Deserialize, Serialize};

use super::{merge_venue, CacheItem, Translations, VenueData};
use crate::merge::{self, MergeFrom};

/// A team or individual competitor.
///
/// Translatable fields: `names`, `countries`, `abbreviations`. A competitor
/// seen inside a summary or group listing is complete for that locale; the
/// full profile additionally fills players, venue and jerseys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorItem {
    pub id: EntityId,
    pub fetched_locales: BTreeSet<Locale>,
    /// Locales whose full profile has been merged.
    pub profile_locales: BTreeSet<Locale>,
    pub names: Translations,
    pub countries: Translations,
    pub abbreviations: Translations,
    pub country_code: Option<String>,
    pub gender: Option<String>,
    pub player_ids: Option<Vec<EntityId>>,
    pub venue: Option<VenueData>,
    pub manager_name: Option<String>,
    pub jerseys: Vec<String>,
}

impl CompetitorItem {
    pub fn name(&self, locale: &Locale) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }
}

impl CacheItem for CompetitorItem {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            fetched_locales: BTreeSet::new(),
            profile_locales: BTreeSet::new(),
            names: Translations::new(),
            countries: Translations::new(),
            abbreviations: Translations::new(),
            country_code: None,
            gender: None,
            player_ids: None,
            venue: None,
            manager_name: None,
            jerseys: Vec::new(),
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

impl MergeFrom<TeamCompetitorDto> for CompetitorItem {
    fn merge_from(&mut self, dto: &TeamCompetitorDto, locale: &Locale, kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        merge::scalar(&mut self.country_code, dto.country_code.clone());
        merge::scalar(&mut self.gender, dto.gender.clone());
        if kind.completes_locale() {
            merge::translation_complete(&mut self.countries, locale, dto.country.as_deref());
            merge::translation_complete(&mut self.abbreviations, locale, dto.abbreviation.as_deref());
            self.fetched_locales.insert(locale.clone());
        } else {
            merge::translation(&mut self.countries, locale, dto.country.as_deref());
            merge::translation(&mut self.abbreviations, locale, dto.abbreviation.as_deref());
        }
    }
}

impl MergeFrom<CompetitorProfileDto> for CompetitorItem {
    fn merge_from(&mut self, dto: &CompetitorProfileDto, locale: &Locale, kind: DtoKind) {
        self.merge_from(&dto.competitor, locale, kind);
        if !dto.players.is_empty() {
            self.player_ids = Some(merge::ordered_ids(dto.players.iter().map(|p| &p.id)));
        }
        merge_venue(&mut self.venue, dto.venue.as_ref(), locale);
        merge::scalar(&mut self.manager_name, dto.manager_name.clone());
        if !dto.jerseys.is_empty() {
            self.jerseys = dto.jerseys.clone();
        }
        self.profile_locales.insert(locale.clone());
    }
}

/// Translatable fields: `names`, `nationalities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerItem {
    pub id: EntityId,
    pub fetched_locales: BTreeSet<Locale>,
    pub names: Translations,
    pub nationalities: Translations,
    pub date_of_birth: Option<NaiveDate>,
    pub height: Option<u32>,
    pub weight: Option<u32>,
    pub player_type: Option<String>,
    pub jersey_number: Option<u32>,
    pub competitor_id: Option<EntityId>,
}

impl PlayerItem {
    pub fn name(&self, locale: &Locale) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }
}

impl CacheItem for PlayerItem {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            fetched_locales: BTreeSet::new(),
            names: Translations::new(),
            nationalities: Translations::new(),
            date_of_birth: None,
            height: None,
            weight: None,
            player_type: None,
            jersey_number: None,
            competitor_id: None,
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

impl MergeFrom<PlayerProfileDto> for PlayerItem {
    fn merge_from(&mut self, dto: &PlayerProfileDto, locale: &Locale, kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        merge::scalar(&mut self.date_of_birth, dto.date_of_birth);
        merge::scalar(&mut self.height, dto.height);
        merge::scalar(&mut self.weight, dto.weight);
        merge::scalar(&mut self.player_type, dto.player_type.clone());
        merge::scalar(&mut self.jersey_number, dto.jersey_number);
        merge::scalar(&mut self.competitor_id, dto.competitor_id.clone());
        if kind.completes_locale() {
            merge::translation_complete(&mut self.nationalities, locale, dto.nationality.as_deref());
            self.fetched_locales.insert(locale.clone());
        } else {
            merge::translation(&mut self.nationalities, locale, dto.nationality.as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsfeed_test_utils::fixtures::*;

    #[test]
    fn test_embedded_competitor_completes_locale() {
        let en = Locale::new("en");
        let mut item = CompetitorItem::new(competitor_id(3));
        item.merge_from(&competitor_dto(3, "Rovers"), &en, DtoKind::MatchSummary);

        assert!(item.fetched_locales.contains(&en));
        assert!(item.profile_locales.is_empty());
        assert_eq!(item.name(&en), Some("Rovers"));
        assert_eq!(item.abbreviations.get(&en).map(String::as_str), Some("ROV"));
        assert_eq!(item.countries.get(&en).map(String::as_str), Some(""));
    }

    #[test]
    fn test_profile_merge_fills_players_and_keeps_other_locales() {
        let en = Locale::new("en");
        let de = Locale::new("de");
        let mut item = CompetitorItem::new(competitor_id(3));
        item.merge_from(&competitor_dto(3, "Rovers"), &en, DtoKind::MatchSummary);

        let profile = competitor_profile(3, "Rovers DE", vec![player_dto(31, "Keeper", Some(3))]);
        item.merge_from(&profile, &de, DtoKind::CompetitorProfile);

        assert_eq!(item.name(&en), Some("Rovers"));
        assert_eq!(item.name(&de), Some("Rovers DE"));
        assert_eq!(item.player_ids, Some(vec![player_id(31)]));
        assert_eq!(item.jerseys, vec!["home".to_string(), "away".to_string()]);
        assert!(item.profile_locales.contains(&de));
        assert_eq!(item.fetched_locales.len(), 2);
    }

    #[test]
    fn test_player_merge() {
        let en = Locale::new("en");
        let mut item = PlayerItem::new(player_id(31));
        assert!(item.is_placeholder());
        item.merge_from(&player_dto(31, "Keeper", Some(3)), &en, DtoKind::PlayerProfile);

        assert!(!item.is_placeholder());
        assert_eq!(item.name(&en), Some("Keeper"));
        assert_eq!(item.competitor_id, Some(competitor_id(3)));
        assert_eq!(item.nationalities.get(&en).map(String::as_str), Some("England"));
    }
}
