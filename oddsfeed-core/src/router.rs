//! The remote data source consumed by the caches.
//!
//! Every call is scoped to one id (or listing) and one locale. The router owns
//! transport concerns: URL construction, deserialization and per-call
//! timeouts. A timeout surfaces as [`FetchError::Communication`].

use async_trait::async_trait;

use crate::{
    EntityId, FetchResult, FixtureDto, ListingDto, ListingKind, Locale, ProfileDto, SummaryDto,
};

/// Fetch collaborator for the entity caches.
///
/// Implementations must distinguish a confirmed miss ([`FetchError::NotFound`])
/// from a failure to check ([`FetchError::Communication`] and friends); the
/// caches memoize only the former.
///
/// [`FetchError::NotFound`]: crate::FetchError::NotFound
/// [`FetchError::Communication`]: crate::FetchError::Communication
#[async_trait]
pub trait DataRouter: Send + Sync {
    /// Fetch the summary of a sport event, tournament or season.
    async fn fetch_summary(&self, id: &EntityId, locale: &Locale) -> FetchResult<SummaryDto>;

    /// Fetch the fixture of a sport event.
    async fn fetch_fixture(&self, id: &EntityId, locale: &Locale) -> FetchResult<FixtureDto>;

    /// Fetch a competitor or player profile.
    async fn fetch_profile(&self, id: &EntityId, locale: &Locale) -> FetchResult<ProfileDto>;

    /// Fetch a bulk listing.
    async fn fetch_bulk_listing(
        &self,
        kind: &ListingKind,
        locale: &Locale,
    ) -> FetchResult<Vec<ListingDto>>;
}
