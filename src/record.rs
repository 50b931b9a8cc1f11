use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::season::{Season, SeasonType};

pub type EntityId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Team,
}

impl EntityKind {
    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Team => "team",
        }
    }

    pub fn code(self) -> i64 {
        match self {
            EntityKind::Player => 1,
            EntityKind::Team => 2,
        }
    }

    pub fn id_field(self) -> &'static str {
        match self {
            EntityKind::Player => "PLAYER_ID",
            EntityKind::Team => "TEAM_ID",
        }
    }

    pub fn api_name(self) -> &'static str {
        match self {
            EntityKind::Player => "Player",
            EntityKind::Team => "Team",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "player" | "players" => Some(EntityKind::Player),
            "team" | "teams" => Some(EntityKind::Team),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-entity column values keyed by column name. `None` means the upstream
/// did not measure the value; `Some(0.0)` means it was measured as zero.
pub type StatValues = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatRecord {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub season: Season,
    pub season_type: SeasonType,
    pub values: StatValues,
}

impl RawStatRecord {
    pub fn value(&self, stat: &str) -> Option<f64> {
        self.values.get(stat).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub name: String,
    pub team_id: Option<EntityId>,
    pub abbreviation: Option<String>,
}
