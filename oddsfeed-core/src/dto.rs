//! Data transfer objects returned by the data router.
//!
//! Every DTO is locale-scoped: translatable values are plain strings and the
//! locale travels next to the DTO, never inside it. Optional collections use
//! `Option<Vec<_>>` where the difference between "absent" and "empty" matters
//! to the merge rules (group membership, competitor lists).

use crate::{EntityId, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// REFERENCE DTOS (embedded in larger payloads)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportRefDto {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRefDto {
    pub id: EntityId,
    pub name: String,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRefDto {
    pub id: EntityId,
    pub name: String,
    pub sport: Option<SportRefDto>,
    pub category: Option<CategoryRefDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRefDto {
    pub id: EntityId,
    pub name: String,
    pub year: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub tournament_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueDto {
    pub id: EntityId,
    pub name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub capacity: Option<u32>,
    pub coordinates: Option<String>,
}

/// A competitor as it appears inside a summary, fixture or group listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCompetitorDto {
    pub id: EntityId,
    pub name: String,
    pub abbreviation: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub gender: Option<String>,
    /// `home` / `away` for matches; absent elsewhere.
    pub qualifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDto {
    pub kind: Option<String>,
    pub number: Option<u32>,
    pub name: Option<String>,
    pub group: Option<String>,
}

// ============================================================================
// SPORT EVENTS
// ============================================================================

/// Summary of a match or stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportEventSummaryDto {
    pub id: EntityId,
    pub name: Option<String>,
    pub scheduled: Option<Timestamp>,
    pub scheduled_end: Option<Timestamp>,
    pub start_time_tbd: Option<bool>,
    pub tournament: Option<TournamentRefDto>,
    pub season: Option<SeasonRefDto>,
    pub venue: Option<VenueDto>,
    pub competitors: Option<Vec<TeamCompetitorDto>>,
    pub status: Option<String>,
    pub round: Option<RoundDto>,
    /// Stage-only: `race`, `practice`, ...
    pub stage_type: Option<String>,
    /// Stage-only: the parent stage.
    pub parent_id: Option<EntityId>,
    /// Stage-only: child stages.
    pub child_ids: Option<Vec<EntityId>>,
}

impl SportEventSummaryDto {
    /// A summary carrying nothing but the id.
    pub fn bare(id: EntityId) -> Self {
        Self {
            id,
            name: None,
            scheduled: None,
            scheduled_end: None,
            start_time_tbd: None,
            tournament: None,
            season: None,
            venue: None,
            competitors: None,
            status: None,
            round: None,
            stage_type: None,
            parent_id: None,
            child_ids: None,
        }
    }
}

/// Fixture of a sport event: the summary plus fixture-only detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureDto {
    pub summary: SportEventSummaryDto,
    pub start_time_confirmed: Option<bool>,
    pub reference_ids: BTreeMap<String, String>,
    pub extra_info: BTreeMap<String, String>,
    pub tv_channels: Vec<String>,
}

// ============================================================================
// TOURNAMENTS AND SEASONS
// ============================================================================

/// A named/identified subset of competitors inside a tournament or season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDto {
    pub id: Option<String>,
    pub name: Option<String>,
    pub competitors: Vec<TeamCompetitorDto>,
}

/// Tournament or season information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentInfoDto {
    pub id: EntityId,
    pub name: String,
    pub sport: Option<SportRefDto>,
    pub category: Option<CategoryRefDto>,
    pub current_season: Option<SeasonRefDto>,
    pub scheduled: Option<Timestamp>,
    pub scheduled_end: Option<Timestamp>,
    /// `None` means the source no longer reports groups for this tournament.
    pub groups: Option<Vec<GroupDto>>,
    /// Root-level competitor list, provided independently of groups.
    pub competitors: Option<Vec<TeamCompetitorDto>>,
    pub year: Option<String>,
}

// ============================================================================
// SPORTS AND CATEGORIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDto {
    pub id: EntityId,
    pub name: String,
    pub country_code: Option<String>,
    pub tournaments: Option<Vec<TournamentRefDto>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportDto {
    pub id: EntityId,
    pub name: String,
    pub categories: Option<Vec<CategoryDto>>,
}

// ============================================================================
// PROFILES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfileDto {
    pub id: EntityId,
    pub name: String,
    pub nationality: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub height: Option<u32>,
    pub weight: Option<u32>,
    pub player_type: Option<String>,
    pub jersey_number: Option<u32>,
    pub competitor_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorProfileDto {
    pub competitor: TeamCompetitorDto,
    pub players: Vec<PlayerProfileDto>,
    pub venue: Option<VenueDto>,
    pub manager_name: Option<String>,
    pub jerseys: Vec<String>,
}

// ============================================================================
// ROUTER RESPONSE UNIONS
// ============================================================================

/// What a summary fetch returns for an event or a tournament/season id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryDto {
    SportEvent(SportEventSummaryDto),
    Tournament(TournamentInfoDto),
}

impl SummaryDto {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::SportEvent(dto) => &dto.id,
            Self::Tournament(dto) => &dto.id,
        }
    }
}

/// What a profile fetch returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileDto {
    Competitor(CompetitorProfileDto),
    Player(PlayerProfileDto),
}

impl ProfileDto {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::Competitor(dto) => &dto.competitor.id,
            Self::Player(dto) => &dto.id,
        }
    }
}

/// Bulk listings offered by the router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingKind {
    /// Every sport with its categories and tournaments.
    Sports,
    /// Every tournament known to the feed.
    AllTournaments,
    /// Sport events scheduled in a tournament or season.
    TournamentSchedule(EntityId),
    /// Categories (with tournaments) of a single sport.
    SportCategories(EntityId),
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sports => f.write_str("sports"),
            Self::AllTournaments => f.write_str("all-tournaments"),
            Self::TournamentSchedule(id) => write!(f, "schedule:{id}"),
            Self::SportCategories(id) => write!(f, "categories:{id}"),
        }
    }
}

/// One entry of a bulk listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingDto {
    SportEvent(SportEventSummaryDto),
    Tournament(TournamentInfoDto),
    Sport(SportDto),
}

impl ListingDto {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::SportEvent(dto) => &dto.id,
            Self::Tournament(dto) => &dto.id,
            Self::Sport(dto) => &dto.id,
        }
    }
}

// ============================================================================
// PUBLICATION
// ============================================================================

/// The endpoint a published DTO came from.
///
/// The kind decides which fetched-locale sets a merge may mark: a listing
/// entry never completes a locale, a full summary or profile does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DtoKind {
    MatchSummary,
    Fixture,
    SportEventListing,
    TournamentInfo,
    TournamentListing,
    SportListing,
    CompetitorProfile,
    PlayerProfile,
}

impl DtoKind {
    pub const ALL: [DtoKind; 8] = [
        DtoKind::MatchSummary,
        DtoKind::Fixture,
        DtoKind::SportEventListing,
        DtoKind::TournamentInfo,
        DtoKind::TournamentListing,
        DtoKind::SportListing,
        DtoKind::CompetitorProfile,
        DtoKind::PlayerProfile,
    ];

    /// Whether a merge of this kind completes the locale for the item it targets.
    pub fn completes_locale(&self) -> bool {
        !matches!(
            self,
            DtoKind::SportEventListing | DtoKind::TournamentListing
        )
    }
}

impl fmt::Display for DtoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Union of every DTO that can be published through the cache coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dto {
    SportEvent(SportEventSummaryDto),
    Fixture(FixtureDto),
    Tournament(TournamentInfoDto),
    Sport(SportDto),
    Competitor(CompetitorProfileDto),
    Player(PlayerProfileDto),
}

impl Dto {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::SportEvent(dto) => &dto.id,
            Self::Fixture(dto) => &dto.summary.id,
            Self::Tournament(dto) => &dto.id,
            Self::Sport(dto) => &dto.id,
            Self::Competitor(dto) => &dto.competitor.id,
            Self::Player(dto) => &dto.id,
        }
    }

    /// The event summary carried by this DTO, if any.
    pub fn event_summary(&self) -> Option<&SportEventSummaryDto> {
        match self {
            Self::SportEvent(dto) => Some(dto),
            Self::Fixture(dto) => Some(&dto.summary),
            _ => None,
        }
    }
}

impl From<SummaryDto> for Dto {
    fn from(summary: SummaryDto) -> Self {
        match summary {
            SummaryDto::SportEvent(dto) => Dto::SportEvent(dto),
            SummaryDto::Tournament(dto) => Dto::Tournament(dto),
        }
    }
}

impl From<ProfileDto> for Dto {
    fn from(profile: ProfileDto) -> Self {
        match profile {
            ProfileDto::Competitor(dto) => Dto::Competitor(dto),
            ProfileDto::Player(dto) => Dto::Player(dto),
        }
    }
}

impl From<ListingDto> for Dto {
    fn from(entry: ListingDto) -> Self {
        match entry {
            ListingDto::SportEvent(dto) => Dto::SportEvent(dto),
            ListingDto::Tournament(dto) => Dto::Tournament(dto),
            ListingDto::Sport(dto) => Dto::Sport(dto),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_kind_display() {
        let id = EntityId::parse("sr:tournament:17").unwrap();
        assert_eq!(ListingKind::TournamentSchedule(id).to_string(), "schedule:sr:tournament:17");
        assert_eq!(ListingKind::Sports.to_string(), "sports");
    }

    #[test]
    fn test_listing_kinds_do_not_complete_locales() {
        assert!(!DtoKind::SportEventListing.completes_locale());
        assert!(!DtoKind::TournamentListing.completes_locale());
        assert!(DtoKind::MatchSummary.completes_locale());
        assert!(DtoKind::CompetitorProfile.completes_locale());
    }

    #[test]
    fn test_dto_id_and_summary_access() {
        let id = EntityId::parse("sr:match:3").unwrap();
        let fixture = Dto::Fixture(FixtureDto {
            summary: SportEventSummaryDto::bare(id.clone()),
            start_time_confirmed: Some(true),
            reference_ids: BTreeMap::new(),
            extra_info: BTreeMap::new(),
            tv_channels: vec![],
        });
        assert_eq!(fixture.id(), &id);
        assert_eq!(fixture.event_summary().map(|s| &s.id), Some(&id));

        let summary = Dto::from(SummaryDto::SportEvent(SportEventSummaryDto::bare(id.clone())));
        assert!(matches!(summary, Dto::SportEvent(_)));
    }
}
