//! ODDSFEED Core - Identity, DTO and Error Types
//!
//! Pure data structures shared by the cache engine and its collaborators.
//! This crate contains no caching logic: ids and locales, the DTOs returned
//! by the data router, the error taxonomy, configuration, and the
//! [`DataRouter`] trait the caches fetch through.

pub mod config;
pub mod dto;
pub mod error;
pub mod identity;
pub mod router;

pub use config::{parse_locales, CacheConfig};
pub use dto::{
    CategoryDto, CategoryRefDto, CompetitorProfileDto, Dto, DtoKind, FixtureDto, GroupDto,
    ListingDto, ListingKind, PlayerProfileDto, ProfileDto, RoundDto, SeasonRefDto, SportDto,
    SportEventSummaryDto, SportRefDto, SummaryDto, TeamCompetitorDto, TournamentInfoDto,
    TournamentRefDto, VenueDto,
};
pub use error::{
    CacheError, ConfigError, ExceptionStrategy, FetchError, FetchResult, IdParseError,
    OddsfeedError, OddsfeedResult,
};
pub use identity::{EntityId, EntityKind, Locale, Timestamp};
pub use router::DataRouter;
