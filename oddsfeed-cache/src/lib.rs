//! ODDSFEED Cache - Multi-Locale Entity Cache Engine
//!
//! In-memory caches for sport events, competitor/player profiles and sport
//! data, filled incrementally one `(id, locale)` fetch at a time through a
//! [`DataRouter`]. Every DTO fetched by one cache is published through the
//! [`CacheCoordinator`] so the others fill themselves from it.
//!
//! Build the caches through [`OddsfeedCaches::build`], which registers every
//! cache with the coordinator before returning.

pub mod coordinator;
pub mod export;
pub mod item;
pub mod keyed_lock;
pub mod maintenance;
pub mod merge;
pub mod negative;
pub mod profile;
pub mod sport_data;
pub mod sport_event;
pub mod store;

mod fetch;

pub use coordinator::{CacheCoordinator, CacheSubscriber};
pub use export::{export_json, import_json, ExportRecord};
pub use item::{
    CacheItem, CategoryItem, CompetitorItem, EventDetail, EventItem, Group, PlayerItem, SportItem,
};
pub use keyed_lock::{KeyedLock, KeyedLockGuard, BULK_KEY};
pub use maintenance::{maintenance_task, MaintenanceConfig, MaintenanceMetrics, MaintenanceSnapshot};
pub use merge::MergeFrom;
pub use negative::NegativeCache;
pub use profile::ProfileCache;
pub use sport_data::SportDataCache;
pub use sport_event::SportEventCache;
pub use store::ItemStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use oddsfeed_core::{CacheConfig, DataRouter, DtoKind, EntityId, OddsfeedResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ============================================================================
// FACADE
// ============================================================================

/// The three entity caches wired to one coordinator.
///
/// Cloning is cheap and shares the caches.
#[derive(Clone)]
pub struct OddsfeedCaches {
    config: CacheConfig,
    coordinator: Arc<CacheCoordinator>,
    sport_events: Arc<SportEventCache>,
    profiles: Arc<ProfileCache>,
    sport_data: Arc<SportDataCache>,
}

impl OddsfeedCaches {
    /// Validate `config`, create the caches and register them.
    ///
    /// Call from within a tokio runtime to enable the blocking forms.
    pub fn build(config: CacheConfig, router: Arc<dyn DataRouter>) -> OddsfeedResult<Self> {
        config.validate()?;

        let coordinator = Arc::new(CacheCoordinator::new());
        let sport_events = Arc::new(SportEventCache::new(
            &config,
            Arc::clone(&router),
            Arc::clone(&coordinator),
        ));
        let profiles = Arc::new(ProfileCache::new(
            &config,
            Arc::clone(&router),
            Arc::clone(&coordinator),
        ));
        let sport_data = Arc::new(SportDataCache::new(
            &config,
            router,
            Arc::clone(&coordinator),
        ));

        let subscribers: [Arc<dyn CacheSubscriber>; 3] = [
            sport_events.clone(),
            profiles.clone(),
            sport_data.clone(),
        ];
        for subscriber in &subscribers {
            coordinator.register(subscriber);
        }

        tracing::info!(
            default_locales = ?config.default_locales,
            strategy = config.exception_strategy.as_str(),
            "Oddsfeed caches ready"
        );

        Ok(Self {
            config,
            coordinator,
            sport_events,
            profiles,
            sport_data,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }

    pub fn sport_events(&self) -> &Arc<SportEventCache> {
        &self.sport_events
    }

    pub fn profiles(&self) -> &Arc<ProfileCache> {
        &self.profiles
    }

    pub fn sport_data(&self) -> &Arc<SportDataCache> {
        &self.sport_data
    }

    /// Item count per entity kind across every cache.
    pub fn status(&self) -> BTreeMap<String, usize> {
        self.coordinator.status()
    }

    /// Drop `id` from every cache. Returns the number of caches that held it.
    pub fn invalidate(&self, id: &EntityId) -> usize {
        self.coordinator.invalidate(id)
    }

    /// Drop `id` from the caches that merge DTOs of `kind`.
    pub fn invalidate_kind(&self, id: &EntityId, kind: DtoKind) -> usize {
        self.coordinator.invalidate_kind(id, kind)
    }

    /// Every item of every cache, sorted by id.
    pub fn export(&self) -> Vec<ExportRecord> {
        let mut records = self.sport_events.export();
        records.extend(self.profiles.export());
        records.extend(self.sport_data.export());
        export::sort_records(&mut records);
        records
    }

    /// Route each record to the cache holding its kind. Returns the number
    /// of records stored.
    pub fn import(&self, records: Vec<ExportRecord>) -> OddsfeedResult<usize> {
        let mut events = Vec::new();
        let mut profiles = Vec::new();
        let mut sport_data = Vec::new();
        for record in records {
            match record {
                ExportRecord::Event(_) => events.push(record),
                ExportRecord::Competitor(_) | ExportRecord::Player(_) => profiles.push(record),
                ExportRecord::Sport(_) | ExportRecord::Category(_) => sport_data.push(record),
            }
        }
        Ok(self.sport_events.import(events)?
            + self.profiles.import(profiles)?
            + self.sport_data.import(sport_data)?)
    }

    /// Spawn [`maintenance_task`] on the current runtime with intervals from
    /// the cache configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn_maintenance(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<Arc<MaintenanceMetrics>> {
        let config = MaintenanceConfig::from(&self.config);
        tokio::spawn(maintenance_task(self.clone(), config, shutdown_rx))
    }
}

impl std::fmt::Debug for OddsfeedCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OddsfeedCaches")
            .field("sport_events", &self.sport_events)
            .field("profiles", &self.profiles)
            .field("sport_data", &self.sport_data)
            .finish()
    }
}
