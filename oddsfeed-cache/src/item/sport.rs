//! Sport and category items.

use std::collections::BTreeSet;

use oddsfeed_core::{CategoryDto, CategoryRefDto, DtoKind, EntityId, Locale, SportDto, SportRefDto};
use serde::{Deserialize, Serialize};

use super::{CacheItem, Translations};
use crate::merge::{self, MergeFrom};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportItem {
    pub id: EntityId,
    pub fetched_locales: BTreeSet<Locale>,
    pub names: Translations,
    /// Grows with every listing; never shrinks on merge.
    pub category_ids: Vec<EntityId>,
}

impl SportItem {
    pub fn name(&self, locale: &Locale) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }
}

impl CacheItem for SportItem {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            fetched_locales: BTreeSet::new(),
            names: Translations::new(),
            category_ids: Vec::new(),
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

impl MergeFrom<SportDto> for SportItem {
    fn merge_from(&mut self, dto: &SportDto, locale: &Locale, kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        if let Some(categories) = &dto.categories {
            merge::union_ids(&mut self.category_ids, categories.iter().map(|c| &c.id));
        }
        if kind.completes_locale() {
            self.fetched_locales.insert(locale.clone());
        }
    }
}

impl MergeFrom<SportRefDto> for SportItem {
    fn merge_from(&mut self, dto: &SportRefDto, locale: &Locale, _kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryItem {
    pub id: EntityId,
    pub fetched_locales: BTreeSet<Locale>,
    pub sport_id: Option<EntityId>,
    pub names: Translations,
    pub country_code: Option<String>,
    /// Grows with every listing; never shrinks on merge.
    pub tournament_ids: Vec<EntityId>,
}

impl CategoryItem {
    pub fn name(&self, locale: &Locale) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }

    /// Merge a category listed under `sport_id`.
    pub fn merge_listed(&mut self, dto: &CategoryDto, sport_id: &EntityId, locale: &Locale, kind: DtoKind) {
        self.sport_id = Some(sport_id.clone());
        self.merge_from(dto, locale, kind);
    }
}

impl CacheItem for CategoryItem {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            fetched_locales: BTreeSet::new(),
            sport_id: None,
            names: Translations::new(),
            country_code: None,
            tournament_ids: Vec::new(),
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

impl MergeFrom<CategoryDto> for CategoryItem {
    fn merge_from(&mut self, dto: &CategoryDto, locale: &Locale, kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        merge::scalar(&mut self.country_code, dto.country_code.clone());
        if let Some(tournaments) = &dto.tournaments {
            merge::union_ids(&mut self.tournament_ids, tournaments.iter().map(|t| &t.id));
        }
        if kind.completes_locale() {
            self.fetched_locales.insert(locale.clone());
        }
    }
}

impl MergeFrom<CategoryRefDto> for CategoryItem {
    fn merge_from(&mut self, dto: &CategoryRefDto, locale: &Locale, _kind: DtoKind) {
        merge::translation(&mut self.names, locale, Some(dto.name.as_str()));
        merge::scalar(&mut self.country_code, dto.country_code.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddsfeed_test_utils::fixtures::*;

    #[test]
    fn test_sport_categories_accumulate() {
        let en = Locale::new("en");
        let mut sport = SportItem::new(sport_id(1));
        sport.merge_from(
            &sport_dto(1, "Soccer", vec![category_dto(1, "England", &[1])]),
            &en,
            DtoKind::SportListing,
        );
        sport.merge_from(
            &sport_dto(1, "Soccer", vec![category_dto(2, "Spain", &[2])]),
            &en,
            DtoKind::SportListing,
        );
        assert_eq!(sport.category_ids, vec![category_id(1), category_id(2)]);
        assert!(sport.fetched_locales.contains(&en));
    }

    #[test]
    fn test_category_ref_does_not_complete() {
        let en = Locale::new("en");
        let mut category = CategoryItem::new(category_id(1));
        category.merge_from(&category_ref(1, "England"), &en, DtoKind::TournamentInfo);
        assert_eq!(category.name(&en), Some("England"));
        assert!(category.fetched_locales.is_empty());

        category.merge_listed(&category_dto(1, "England", &[1, 2]), &sport_id(1), &en, DtoKind::SportListing);
        assert_eq!(category.sport_id, Some(sport_id(1)));
        assert_eq!(category.tournament_ids, vec![tournament_id(1), tournament_id(2)]);
        assert!(category.fetched_locales.contains(&en));
    }
}
