//! Export and import of cache contents.
//!
//! Records are kind-tagged and sorted by id. Importing a record stores the
//! item exactly as exported, overwriting any item with the same id, and
//! forgets negative entries for it. Import never fetches.

use std::sync::Arc;

use oddsfeed_core::{CacheError, EntityId, OddsfeedResult};
use serde::{Deserialize, Serialize};

use crate::item::{CacheItem, CategoryItem, CompetitorItem, EventItem, PlayerItem, SportItem};
use crate::profile::ProfileCache;
use crate::sport_data::SportDataCache;
use crate::sport_event::SportEventCache;

/// One exported cache item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "item", rename_all = "snake_case")]
pub enum ExportRecord {
    Event(EventItem),
    Competitor(CompetitorItem),
    Player(PlayerItem),
    Sport(SportItem),
    Category(CategoryItem),
}

impl ExportRecord {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::Event(item) => item.id(),
            Self::Competitor(item) => item.id(),
            Self::Player(item) => item.id(),
            Self::Sport(item) => item.id(),
            Self::Category(item) => item.id(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Competitor(_) => "competitor",
            Self::Player(_) => "player",
            Self::Sport(_) => "sport",
            Self::Category(_) => "category",
        }
    }
}

/// Sort records by id, the order every export uses.
pub fn sort_records(records: &mut [ExportRecord]) {
    records.sort_by(|a, b| a.id().cmp(b.id()));
}

fn unwrap_arc<T: Clone>(item: Arc<T>) -> T {
    Arc::try_unwrap(item).unwrap_or_else(|shared| (*shared).clone())
}

fn foreign(cache: &str, record: &ExportRecord) -> CacheError {
    CacheError::Import {
        reason: format!(
            "{cache} cannot hold {} record {}",
            record.kind_name(),
            record.id()
        ),
    }
}

// ============================================================================
// PER-CACHE EXPORT / IMPORT
// ============================================================================

impl SportEventCache {
    /// Every event, tournament and season item, sorted by id.
    pub fn export(&self) -> Vec<ExportRecord> {
        self.store()
            .snapshot()
            .into_iter()
            .map(|item| ExportRecord::Event(unwrap_arc(item)))
            .collect()
    }

    /// Store the given event records. Fails without storing anything when a
    /// record of another kind is present.
    pub fn import(&self, records: Vec<ExportRecord>) -> OddsfeedResult<usize> {
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match record {
                ExportRecord::Event(item) => items.push(item),
                other => return Err(foreign("sport_event_cache", &other).into()),
            }
        }
        let count = items.len();
        for item in items {
            self.clear_negative(&item.id);
            self.store().insert(item);
        }
        tracing::debug!(cache = "sport_event_cache", records = count, "Imported");
        Ok(count)
    }
}

impl ProfileCache {
    /// Every competitor and player item, sorted by id.
    pub fn export(&self) -> Vec<ExportRecord> {
        let mut records: Vec<ExportRecord> = self
            .competitor_store()
            .snapshot()
            .into_iter()
            .map(|item| ExportRecord::Competitor(unwrap_arc(item)))
            .chain(
                self.player_store()
                    .snapshot()
                    .into_iter()
                    .map(|item| ExportRecord::Player(unwrap_arc(item))),
            )
            .collect();
        sort_records(&mut records);
        records
    }

    /// Store the given competitor and player records.
    pub fn import(&self, records: Vec<ExportRecord>) -> OddsfeedResult<usize> {
        if let Some(other) = records
            .iter()
            .find(|r| !matches!(r, ExportRecord::Competitor(_) | ExportRecord::Player(_)))
        {
            return Err(foreign("profile_cache", other).into());
        }
        let count = records.len();
        for record in records {
            self.clear_negative(record.id());
            match record {
                ExportRecord::Competitor(item) => {
                    self.competitor_store().insert(item);
                }
                ExportRecord::Player(item) => {
                    self.player_store().insert(item);
                }
                _ => {}
            }
        }
        tracing::debug!(cache = "profile_cache", records = count, "Imported");
        Ok(count)
    }
}

impl SportDataCache {
    /// Every sport and category item, sorted by id.
    pub fn export(&self) -> Vec<ExportRecord> {
        let mut records: Vec<ExportRecord> = self
            .sport_store()
            .snapshot()
            .into_iter()
            .map(|item| ExportRecord::Sport(unwrap_arc(item)))
            .chain(
                self.category_store()
                    .snapshot()
                    .into_iter()
                    .map(|item| ExportRecord::Category(unwrap_arc(item))),
            )
            .collect();
        sort_records(&mut records);
        records
    }

    /// Store the given sport and category records.
    pub fn import(&self, records: Vec<ExportRecord>) -> OddsfeedResult<usize> {
        if let Some(other) = records
            .iter()
            .find(|r| !matches!(r, ExportRecord::Sport(_) | ExportRecord::Category(_)))
        {
            return Err(foreign("sport_data_cache", other).into());
        }
        let count = records.len();
        for record in records {
            match record {
                ExportRecord::Sport(item) => {
                    self.clear_negative(&item.id);
                    self.sport_store().insert(item);
                }
                ExportRecord::Category(item) => self.restore_category(item),
                _ => {}
            }
        }
        tracing::debug!(cache = "sport_data_cache", records = count, "Imported");
        Ok(count)
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Serialize records as a JSON array.
pub fn export_json(records: &[ExportRecord]) -> OddsfeedResult<String> {
    serde_json::to_string(records).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
        .into()
    })
}

/// Parse a JSON array produced by [`export_json`].
pub fn import_json(json: &str) -> OddsfeedResult<Vec<ExportRecord>> {
    serde_json::from_str(json).map_err(|e| {
        CacheError::Import {
            reason: e.to_string(),
        }
        .into()
    })
}
