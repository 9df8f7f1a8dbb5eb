//! Cache items: mutable, incrementally merged aggregates, one per entity.
//!
//! Items are stored as `Arc` snapshots. A merge works on a private copy (or in
//! place when no reader holds the snapshot) and the result replaces the stored
//! `Arc`, so readers never observe a half-applied merge.
//!
//! Every item keeps a set of fetched locales. A locale enters that set only
//! together with an entry for it in every translatable field of the item.

pub mod event;
pub mod profile;
pub mod sport;

use std::collections::{BTreeMap, BTreeSet};

use oddsfeed_core::{EntityId, Locale, VenueDto};
use serde::{Deserialize, Serialize};

use crate::merge;

pub use event::{EventDetail, EventItem, FixtureData, MatchDetail, RoundData, StageDetail, TournamentDetail};
pub use profile::{CompetitorItem, PlayerItem};
pub use sport::{CategoryItem, SportItem};

/// Translatable value: one string per locale.
pub type Translations = BTreeMap<Locale, String>;

/// Behaviour shared by every cached aggregate.
pub trait CacheItem: Clone + Send + Sync + 'static {
    /// An empty item for `id`.
    fn new(id: EntityId) -> Self;

    fn id(&self) -> &EntityId;

    /// Locales for which the item's complete data set has been merged.
    fn fetched_locales(&self) -> &BTreeSet<Locale>;

    /// `wanted` minus the fetched locales, in request order, without duplicates.
    fn missing_locales(&self, wanted: &[Locale]) -> Vec<Locale> {
        missing_from(Some(self.fetched_locales()), wanted)
    }

    /// True for placeholders that never received any data.
    fn is_placeholder(&self) -> bool;
}

/// `wanted` minus `fetched`, preserving request order and dropping duplicates.
pub fn missing_from(fetched: Option<&BTreeSet<Locale>>, wanted: &[Locale]) -> Vec<Locale> {
    let mut missing: Vec<Locale> = Vec::with_capacity(wanted.len());
    for locale in wanted {
        let done = fetched.map(|set| set.contains(locale)).unwrap_or(false);
        if !done && !missing.contains(locale) {
            missing.push(locale.clone());
        }
    }
    missing
}

/// A named/identified subset of competitors within a tournament or season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Ordered, duplicate free.
    pub competitor_ids: Vec<EntityId>,
}

impl Group {
    pub fn contains(&self, competitor: &EntityId) -> bool {
        self.competitor_ids.contains(competitor)
    }

    /// Number of competitors shared with `other`.
    pub fn overlap(&self, other: &[EntityId]) -> usize {
        other.iter().filter(|id| self.contains(id)).count()
    }
}

/// Venue data embedded in events and competitor profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueData {
    pub id: EntityId,
    pub names: Translations,
    pub cities: Translations,
    pub countries: Translations,
    pub capacity: Option<u32>,
    pub coordinates: Option<String>,
}

impl VenueData {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            names: Translations::new(),
            cities: Translations::new(),
            countries: Translations::new(),
            capacity: None,
            coordinates: None,
        }
    }

    pub fn merge_from(&mut self, dto: &VenueDto, locale: &Locale) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        merge::translation_complete(&mut self.cities, locale, dto.city.as_deref());
        merge::translation_complete(&mut self.countries, locale, dto.country.as_deref());
        merge::scalar(&mut self.capacity, dto.capacity);
        merge::scalar(&mut self.coordinates, dto.coordinates.clone());
    }
}

/// Merge a venue into an optional slot.
///
/// The venue id is last-writer-wins; translations of other locales are kept
/// so every locale fetched before a venue change still has venue text.
pub(crate) fn merge_venue(slot: &mut Option<VenueData>, dto: Option<&VenueDto>, locale: &Locale) {
    let Some(dto) = dto else {
        return;
    };
    let venue = slot.get_or_insert_with(|| VenueData::new(dto.id.clone()));
    if venue.id != dto.id {
        venue.id = dto.id.clone();
    }
    venue.merge_from(dto, locale);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_from_preserves_order_and_dedups() {
        let fetched: BTreeSet<Locale> = [Locale::new("en")].into_iter().collect();
        let wanted = vec![
            Locale::new("de"),
            Locale::new("en"),
            Locale::new("fr"),
            Locale::new("de"),
        ];
        assert_eq!(
            missing_from(Some(&fetched), &wanted),
            vec![Locale::new("de"), Locale::new("fr")]
        );
        assert_eq!(missing_from(None, &wanted).len(), 3);
    }

    #[test]
    fn test_venue_id_change_keeps_other_locales() {
        let en = Locale::new("en");
        let de = Locale::new("de");
        let first = VenueDto {
            id: EntityId::parse("sr:venue:1").unwrap(),
            name: "Old Ground".to_string(),
            city: Some("Leeds".to_string()),
            country: None,
            capacity: Some(30_000),
            coordinates: None,
        };
        let mut slot = None;
        merge_venue(&mut slot, Some(&first), &en);
        assert_eq!(slot.as_ref().unwrap().capacity, Some(30_000));
        assert_eq!(slot.as_ref().unwrap().countries.get(&en).map(String::as_str), Some(""));

        let second = VenueDto {
            id: EntityId::parse("sr:venue:2").unwrap(),
            name: "Neuer Platz".to_string(),
            city: None,
            country: Some("England".to_string()),
            capacity: None,
            coordinates: None,
        };
        merge_venue(&mut slot, Some(&second), &de);
        let venue = slot.unwrap();
        assert_eq!(venue.id.as_str(), "sr:venue:2");
        assert_eq!(venue.capacity, Some(30_000));
        for locale in [&en, &de] {
            assert!(venue.names.contains_key(locale));
            assert!(venue.cities.contains_key(locale));
            assert!(venue.countries.contains_key(locale));
        }
        assert_eq!(venue.names.get(&de).map(String::as_str), Some("Neuer Platz"));

        let mut untouched = Some(venue.clone());
        merge_venue(&mut untouched, None, &en);
        assert_eq!(untouched, Some(venue));
    }
}
