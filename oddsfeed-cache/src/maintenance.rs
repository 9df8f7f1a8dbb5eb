//! Maintenance Background Task
//!
//! Periodically reloads sport data and purges idle cache items. The reload
//! goes through [`SportDataCache::refresh`], the same bulk entry point
//! foreground callers use, so a timer firing during a caller's bulk load
//! shares that load instead of duplicating it.
//!
//! [`SportDataCache::refresh`]: crate::sport_data::SportDataCache::refresh

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oddsfeed_core::CacheConfig;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::OddsfeedCaches;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the maintenance task.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How often sport data is reloaded (default: 12 hours)
    pub refresh_interval: Duration,

    /// How often idle items are purged (default: 10 minutes)
    pub purge_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for MaintenanceConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            refresh_interval: config.sport_data_refresh_interval,
            purge_interval: config.maintenance_interval,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for maintenance activity since the task started.
#[derive(Debug, Default)]
pub struct MaintenanceMetrics {
    pub refresh_cycles: AtomicU64,
    pub locales_refreshed: AtomicU64,
    pub purge_cycles: AtomicU64,
    pub items_purged: AtomicU64,
    pub errors: AtomicU64,
}

impl MaintenanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MaintenanceSnapshot {
        MaintenanceSnapshot {
            refresh_cycles: self.refresh_cycles.load(Ordering::Relaxed),
            locales_refreshed: self.locales_refreshed.load(Ordering::Relaxed),
            purge_cycles: self.purge_cycles.load(Ordering::Relaxed),
            items_purged: self.items_purged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`MaintenanceMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceSnapshot {
    pub refresh_cycles: u64,
    pub locales_refreshed: u64,
    pub purge_cycles: u64,
    pub items_purged: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run maintenance until `shutdown_rx` reports `true`.
///
/// Both timers fire once immediately, so the first cycle preloads sport
/// data. Missed ticks are skipped rather than replayed.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(maintenance_task(caches.clone(), MaintenanceConfig::default(), shutdown_rx));
///
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn maintenance_task(
    caches: OddsfeedCaches,
    config: MaintenanceConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<MaintenanceMetrics> {
    let metrics = Arc::new(MaintenanceMetrics::new());

    let mut refresh_interval = interval(config.refresh_interval);
    refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut purge_interval = interval(config.purge_interval);
    purge_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        refresh_interval_secs = config.refresh_interval.as_secs(),
        purge_interval_secs = config.purge_interval.as_secs(),
        "Cache maintenance task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Cache maintenance task shutting down");
                    break;
                }
            }

            _ = refresh_interval.tick() => {
                refresh_sport_data(&caches, &metrics).await;
            }

            _ = purge_interval.tick() => {
                purge_idle(&caches, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        refresh_cycles = snapshot.refresh_cycles,
        locales_refreshed = snapshot.locales_refreshed,
        purge_cycles = snapshot.purge_cycles,
        items_purged = snapshot.items_purged,
        errors = snapshot.errors,
        "Cache maintenance task completed"
    );

    metrics
}

async fn refresh_sport_data(caches: &OddsfeedCaches, metrics: &MaintenanceMetrics) {
    metrics.refresh_cycles.fetch_add(1, Ordering::Relaxed);
    match caches.sport_data().refresh().await {
        Ok(locales) => {
            metrics
                .locales_refreshed
                .fetch_add(locales as u64, Ordering::Relaxed);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to refresh sport data");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn purge_idle(caches: &OddsfeedCaches, metrics: &MaintenanceMetrics) {
    metrics.purge_cycles.fetch_add(1, Ordering::Relaxed);
    let events = caches.sport_events().purge_idle();
    let profiles = caches.profiles().purge_idle();
    let purged = events + profiles;
    metrics
        .items_purged
        .fetch_add(purged as u64, Ordering::Relaxed);

    if purged > 0 {
        tracing::info!(events, profiles, "Purged idle cache items");
    } else {
        tracing::trace!("Purge cycle completed with no idle items");
    }
}
