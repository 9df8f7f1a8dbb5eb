//! Identity types for cached feed entities

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::IdParseError;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

static ENTITY_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]+):([a-z_]+):(\d+)$").expect("Invalid entity id regex")
});

// ============================================================================
// ENTITY KIND
// ============================================================================

/// Classification of the `kind` segment of an [`EntityId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Match,
    Stage,
    Tournament,
    SimpleTournament,
    Season,
    Competitor,
    SimpleTeam,
    Player,
    Sport,
    Category,
    Venue,
    /// Any kind this crate has no dedicated handling for.
    Other(String),
}

impl EntityKind {
    /// Map an id `kind` segment onto a kind.
    pub fn from_segment(segment: &str) -> Self {
        match segment {
            "match" => Self::Match,
            "stage" | "race_event" => Self::Stage,
            "tournament" => Self::Tournament,
            "simple_tournament" => Self::SimpleTournament,
            "season" => Self::Season,
            "competitor" => Self::Competitor,
            "simpleteam" | "simple_team" => Self::SimpleTeam,
            "player" => Self::Player,
            "sport" => Self::Sport,
            "category" => Self::Category,
            "venue" => Self::Venue,
            other => Self::Other(other.to_string()),
        }
    }

    /// Human readable name, used as the census key for cache status reports.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Match => "Match",
            Self::Stage => "Stage",
            Self::Tournament => "Tournament",
            Self::SimpleTournament => "SimpleTournament",
            Self::Season => "Season",
            Self::Competitor => "Competitor",
            Self::SimpleTeam => "SimpleTeam",
            Self::Player => "Player",
            Self::Sport => "Sport",
            Self::Category => "Category",
            Self::Venue => "Venue",
            Self::Other(name) => name,
        }
    }

    /// Sport events that carry a schedule, venue and competitors.
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Match | Self::Stage)
    }

    /// Tournaments and seasons share the same cache item shape.
    pub fn is_tournament_like(&self) -> bool {
        matches!(
            self,
            Self::Tournament | Self::SimpleTournament | Self::Season
        )
    }

    pub fn is_competitor(&self) -> bool {
        matches!(self, Self::Competitor | Self::SimpleTeam)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ENTITY ID
// ============================================================================

/// Opaque structured identifier of the form `{namespace}:{kind}:{numeric}`.
///
/// Equality, ordering and hashing use the full string value, so two ids that
/// differ only in namespace are different cache keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    raw: String,
    kind_start: usize,
    number_start: usize,
}

impl EntityId {
    /// Parse an id, rejecting anything not matching `{namespace}:{kind}:{numeric}`.
    pub fn parse(raw: &str) -> Result<Self, IdParseError> {
        let captures = ENTITY_ID_PATTERN
            .captures(raw)
            .ok_or_else(|| IdParseError::Malformed {
                value: raw.to_string(),
            })?;

        // Capture groups 2 and 3 always participate in a successful match.
        let kind_start = captures.get(2).map(|m| m.start()).unwrap_or(0);
        let number_start = captures.get(3).map(|m| m.start()).unwrap_or(0);
        let number = &raw[number_start..];
        if number.parse::<u64>().is_err() {
            return Err(IdParseError::NumberOutOfRange {
                value: raw.to_string(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            kind_start,
            number_start,
        })
    }

    /// Build an id from its parts.
    pub fn from_parts(namespace: &str, kind: &str, number: u64) -> Result<Self, IdParseError> {
        Self::parse(&format!("{namespace}:{kind}:{number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn namespace(&self) -> &str {
        &self.raw[..self.kind_start - 1]
    }

    /// The raw `kind` segment.
    pub fn kind_segment(&self) -> &str {
        &self.raw[self.kind_start..self.number_start - 1]
    }

    pub fn kind(&self) -> EntityKind {
        EntityKind::from_segment(self.kind_segment())
    }

    pub fn number(&self) -> u64 {
        // Validated at construction.
        self.raw[self.number_start..].parse().unwrap_or_default()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.raw)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// LOCALE
// ============================================================================

/// Language/region tag keying every translatable field.
///
/// Tags are normalised to lowercase with `-` separators so `pt_BR` and
/// `pt-br` name the same locale. Deserialization normalises too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().replace('_', "-").to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary language subtag (`pt` for `pt-br`).
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Locale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Locale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

impl From<&str> for Locale {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("en")
    }
}
