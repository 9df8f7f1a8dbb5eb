//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every entity cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of reusable keyed-lock slots (distinct keys held at once).
    pub lock_pool_size: usize,
    /// Reaction to fetch failures during get-or-fetch.
    pub exception_strategy: ExceptionStrategy,
    /// Locales requested when the caller does not name any.
    pub default_locales: Vec<Locale>,
    /// Idle expiry for sport event items (nanoseconds when serialized).
    pub event_ttl: Duration,
    /// Idle expiry for competitor and player items.
    pub profile_ttl: Duration,
    /// Automatic expiry of negative-cache entries. `None` keeps them until cleared.
    pub negative_ttl: Option<Duration>,
    /// How often the maintenance task reloads sport data.
    pub sport_data_refresh_interval: Duration,
    /// How often the maintenance task purges idle items.
    pub maintenance_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lock_pool_size: 500,
            exception_strategy: ExceptionStrategy::Suppress,
            default_locales: vec![Locale::new("en")],
            event_ttl: Duration::from_secs(12 * 3600),
            profile_ttl: Duration::from_secs(24 * 3600),
            negative_ttl: None,
            sport_data_refresh_interval: Duration::from_secs(12 * 3600),
            maintenance_interval: Duration::from_secs(600),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the keyed-lock pool size.
    pub fn with_lock_pool_size(mut self, size: usize) -> Self {
        self.lock_pool_size = size;
        self
    }

    /// Set the exception strategy.
    pub fn with_exception_strategy(mut self, strategy: ExceptionStrategy) -> Self {
        self.exception_strategy = strategy;
        self
    }

    /// Set the default locales.
    pub fn with_default_locales(mut self, locales: Vec<Locale>) -> Self {
        self.default_locales = locales;
        self
    }

    /// Set the sport event idle TTL.
    pub fn with_event_ttl(mut self, ttl: Duration) -> Self {
        self.event_ttl = ttl;
        self
    }

    /// Set the profile idle TTL.
    pub fn with_profile_ttl(mut self, ttl: Duration) -> Self {
        self.profile_ttl = ttl;
        self
    }

    /// Set the negative-cache TTL.
    pub fn with_negative_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.negative_ttl = ttl;
        self
    }

    /// Set the sport data refresh interval.
    pub fn with_sport_data_refresh_interval(mut self, interval: Duration) -> Self {
        self.sport_data_refresh_interval = interval;
        self
    }

    /// Set the maintenance interval.
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ODDSFEED_LOCK_POOL_SIZE`: keyed-lock slots (default: 500)
    /// - `ODDSFEED_EXCEPTION_STRATEGY`: `propagate` or `suppress` (default: suppress)
    /// - `ODDSFEED_DEFAULT_LOCALES`: comma separated tags (default: en)
    /// - `ODDSFEED_EVENT_TTL_SECS`: sport event idle TTL (default: 43200)
    /// - `ODDSFEED_PROFILE_TTL_SECS`: profile idle TTL (default: 86400)
    /// - `ODDSFEED_NEGATIVE_TTL_SECS`: negative entry TTL (default: unset)
    /// - `ODDSFEED_SPORT_DATA_REFRESH_SECS`: sport data reload period (default: 43200)
    /// - `ODDSFEED_MAINTENANCE_INTERVAL_SECS`: idle purge period (default: 600)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            lock_pool_size: std::env::var("ODDSFEED_LOCK_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.lock_pool_size),
            exception_strategy: std::env::var("ODDSFEED_EXCEPTION_STRATEGY")
                .ok()
                .and_then(|s| ExceptionStrategy::parse(&s))
                .unwrap_or(defaults.exception_strategy),
            default_locales: std::env::var("ODDSFEED_DEFAULT_LOCALES")
                .ok()
                .map(|s| parse_locales(&s))
                .filter(|locales| !locales.is_empty())
                .unwrap_or(defaults.default_locales),
            event_ttl: env_secs("ODDSFEED_EVENT_TTL_SECS").unwrap_or(defaults.event_ttl),
            profile_ttl: env_secs("ODDSFEED_PROFILE_TTL_SECS").unwrap_or(defaults.profile_ttl),
            negative_ttl: env_secs("ODDSFEED_NEGATIVE_TTL_SECS").or(defaults.negative_ttl),
            sport_data_refresh_interval: env_secs("ODDSFEED_SPORT_DATA_REFRESH_SECS")
                .unwrap_or(defaults.sport_data_refresh_interval),
            maintenance_interval: env_secs("ODDSFEED_MAINTENANCE_INTERVAL_SECS")
                .unwrap_or(defaults.maintenance_interval),
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(OddsfeedError::Config) if invalid.
    ///
    /// Validates:
    /// - lock_pool_size > 0
    /// - default_locales is not empty
    /// - All duration values are positive
    pub fn validate(&self) -> OddsfeedResult<()> {
        if self.lock_pool_size == 0 {
            return Err(invalid(
                "lock_pool_size",
                self.lock_pool_size.to_string(),
                "lock_pool_size must be greater than 0",
            ));
        }

        if self.default_locales.is_empty() {
            return Err(invalid(
                "default_locales",
                "[]".to_string(),
                "at least one default locale is required",
            ));
        }

        let durations = [
            ("event_ttl", Some(self.event_ttl)),
            ("profile_ttl", Some(self.profile_ttl)),
            ("negative_ttl", self.negative_ttl),
            (
                "sport_data_refresh_interval",
                Some(self.sport_data_refresh_interval),
            ),
            ("maintenance_interval", Some(self.maintenance_interval)),
        ];
        for (field, value) in durations {
            if let Some(duration) = value {
                if duration.is_zero() {
                    return Err(invalid(
                        field,
                        format!("{:?}", duration),
                        "duration must be positive",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> OddsfeedError {
    OddsfeedError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Parse a comma separated locale list, skipping blanks.
pub fn parse_locales(raw: &str) -> Vec<Locale> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(Locale::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_lock_pool_size(8)
            .with_exception_strategy(ExceptionStrategy::Propagate)
            .with_default_locales(vec![Locale::new("en"), Locale::new("de")])
            .with_event_ttl(Duration::from_secs(60))
            .with_negative_ttl(Some(Duration::from_secs(30)));

        assert_eq!(config.lock_pool_size, 8);
        assert_eq!(config.exception_strategy, ExceptionStrategy::Propagate);
        assert_eq!(config.default_locales.len(), 2);
        assert_eq!(config.event_ttl, Duration::from_secs(60));
        assert_eq!(config.negative_ttl, Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let err = CacheConfig::new().with_lock_pool_size(0).validate().unwrap_err();
        assert!(matches!(
            err,
            OddsfeedError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "lock_pool_size"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_locales_and_zero_durations() {
        assert!(CacheConfig::new()
            .with_default_locales(vec![])
            .validate()
            .is_err());
        assert!(CacheConfig::new()
            .with_maintenance_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(CacheConfig::new()
            .with_negative_ttl(Some(Duration::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn test_parse_locales() {
        let locales = parse_locales("en, DE,,pt_BR ");
        assert_eq!(
            locales,
            vec![Locale::new("en"), Locale::new("de"), Locale::new("pt-br")]
        );
    }
}
