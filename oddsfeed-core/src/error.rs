//! Error types for oddsfeed cache operations

use crate::{EntityId, Locale};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entity id parse errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("Malformed entity id '{value}': expected namespace:kind:number")]
    Malformed { value: String },

    #[error("Entity id '{value}' has a numeric part out of range")]
    NumberOutOfRange { value: String },
}

/// Failures reported by the data router for a single `(id, locale)` fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The entity is confirmed absent remotely. Feeds the negative cache.
    #[error("Entity {id} not found for locale {locale}")]
    NotFound { id: EntityId, locale: Locale },

    /// Transport failure, timeout or server error. Never cached as a miss.
    #[error("Communication failure fetching {id} ({locale}): {reason}")]
    Communication {
        id: EntityId,
        locale: Locale,
        reason: String,
    },

    #[error("Failed to deserialize payload for {id} ({locale}): {reason}")]
    Deserialization {
        id: EntityId,
        locale: Locale,
        reason: String,
    },

    #[error("Failed to map payload for {id} ({locale}): {reason}")]
    Mapping {
        id: EntityId,
        locale: Locale,
        reason: String,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the next access should try again.
    ///
    /// Everything except a confirmed miss is retryable.
    pub fn is_retryable(&self) -> bool {
        !self.is_not_found()
    }

    pub fn id(&self) -> &EntityId {
        match self {
            Self::NotFound { id, .. }
            | Self::Communication { id, .. }
            | Self::Deserialization { id, .. }
            | Self::Mapping { id, .. } => id,
        }
    }

    pub fn locale(&self) -> &Locale {
        match self {
            Self::NotFound { locale, .. }
            | Self::Communication { locale, .. }
            | Self::Deserialization { locale, .. }
            | Self::Mapping { locale, .. } => locale,
        }
    }
}

/// Cache engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Keyed lock for '{key}' released without an outstanding acquisition")]
    LockNotHeld { key: String },

    #[error("Keyed lock pool has been closed")]
    LockPoolClosed,

    #[error("Fetching {id} failed for {} locale(s)", .failures.len())]
    FetchFailed { id: EntityId, failures: Vec<FetchError> },

    #[error("Import failed: {reason}")]
    Import { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Blocking call requires a tokio runtime captured at construction")]
    NoRuntime,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// How a cache reacts to fetch failures inside a get-or-fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExceptionStrategy {
    /// Re-raise any fetch failure to the caller.
    Propagate,
    /// Log and swallow fetch failures; return whatever data is available.
    #[default]
    Suppress,
}

impl ExceptionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propagate => "propagate",
            Self::Suppress => "suppress",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "propagate" | "throw" => Some(Self::Propagate),
            "suppress" | "catch" => Some(Self::Suppress),
            _ => None,
        }
    }
}

/// Master error type for all oddsfeed errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OddsfeedError {
    #[error("Id error: {0}")]
    Id(#[from] IdParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl OddsfeedError {
    /// True when the error (or every aggregated failure) is a confirmed miss.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_not_found(),
            Self::Cache(CacheError::FetchFailed { failures, .. }) => {
                !failures.is_empty() && failures.iter().all(FetchError::is_not_found)
            }
            _ => false,
        }
    }
}

/// Result type alias for oddsfeed operations.
pub type OddsfeedResult<T> = Result<T, OddsfeedError>;

/// Result type for a single router call.
pub type FetchResult<T> = Result<T, FetchError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> EntityId {
        EntityId::parse("sr:match:1").unwrap()
    }

    #[test]
    fn test_fetch_error_display_not_found() {
        let err = FetchError::NotFound {
            id: id(),
            locale: Locale::new("de"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not found"));
        assert!(msg.contains("sr:match:1"));
        assert!(msg.contains("de"));
    }

    #[test]
    fn test_fetch_error_retryability() {
        let not_found = FetchError::NotFound {
            id: id(),
            locale: Locale::new("en"),
        };
        let comm = FetchError::Communication {
            id: id(),
            locale: Locale::new("en"),
            reason: "timeout".to_string(),
        };
        let mapping = FetchError::Mapping {
            id: id(),
            locale: Locale::new("en"),
            reason: "bad date".to_string(),
        };
        assert!(!not_found.is_retryable());
        assert!(comm.is_retryable());
        assert!(mapping.is_retryable());
        assert_eq!(comm.locale(), &Locale::new("en"));
    }

    #[test]
    fn test_cache_error_display_fetch_failed() {
        let err = CacheError::FetchFailed {
            id: id(),
            failures: vec![
                FetchError::NotFound {
                    id: id(),
                    locale: Locale::new("en"),
                },
                FetchError::NotFound {
                    id: id(),
                    locale: Locale::new("de"),
                },
            ],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("sr:match:1"));
        assert!(msg.contains("2 locale"));
    }

    #[test]
    fn test_oddsfeed_error_is_not_found() {
        let single = OddsfeedError::from(FetchError::NotFound {
            id: id(),
            locale: Locale::new("en"),
        });
        assert!(single.is_not_found());

        let mixed = OddsfeedError::from(CacheError::FetchFailed {
            id: id(),
            failures: vec![
                FetchError::NotFound {
                    id: id(),
                    locale: Locale::new("en"),
                },
                FetchError::Communication {
                    id: id(),
                    locale: Locale::new("de"),
                    reason: "503".to_string(),
                },
            ],
        });
        assert!(!mixed.is_not_found());
    }

    #[test]
    fn test_exception_strategy_parse() {
        assert_eq!(ExceptionStrategy::parse("Propagate"), Some(ExceptionStrategy::Propagate));
        assert_eq!(ExceptionStrategy::parse("catch"), Some(ExceptionStrategy::Suppress));
        assert_eq!(ExceptionStrategy::parse("explode"), None);
        assert_eq!(ExceptionStrategy::default(), ExceptionStrategy::Suppress);
    }

    #[test]
    fn test_oddsfeed_error_from_variants() {
        let parse = OddsfeedError::from(IdParseError::Malformed {
            value: "x".to_string(),
        });
        assert!(matches!(parse, OddsfeedError::Id(_)));

        let cache = OddsfeedError::from(CacheError::LockPoolClosed);
        assert!(matches!(cache, OddsfeedError::Cache(_)));

        let config = OddsfeedError::from(ConfigError::InvalidValue {
            field: "lock_pool_size".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
        assert!(matches!(config, OddsfeedError::Config(_)));
    }
}
