use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scaler::StatMode;
use crate::season::{Season, SeasonType};

const SETTINGS_VERSION: u32 = 1;
pub const SETTINGS_FILE: &str = "view_settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentPolicy {
    #[default]
    Preserve,
    TreatAsZero,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SeasonScope {
    #[default]
    Current,
    LastN {
        years: u32,
    },
    Seasons {
        seasons: Vec<Season>,
    },
    Career,
}

impl SeasonScope {
    pub fn seasons(&self, current: Season) -> Option<Vec<Season>> {
        match self {
            SeasonScope::Current => Some(vec![current]),
            SeasonScope::LastN { years } => {
                let mut out = Vec::new();
                let mut season = current;
                for _ in 0..(*years).max(1) {
                    out.push(season);
                    season = season.previous();
                }
                Some(out)
            }
            SeasonScope::Seasons { seasons } => Some(seasons.clone()),
            SeasonScope::Career => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            SeasonScope::Current => "current season".to_string(),
            SeasonScope::LastN { years } => format!("last {years} seasons"),
            SeasonScope::Seasons { seasons } => seasons
                .iter()
                .map(|s| s.label())
                .collect::<Vec<_>>()
                .join(", "),
            SeasonScope::Career => "career".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSettings {
    #[serde(default = "settings_version")]
    pub version: u32,
    pub mode: StatMode,
    #[serde(default)]
    pub season_scope: SeasonScope,
    pub season_types: Vec<SeasonType>,
    #[serde(default)]
    pub absent_policy: AbsentPolicy,
}

fn settings_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            mode: StatMode::per_36(),
            season_scope: SeasonScope::Current,
            season_types: vec![SeasonType::Regular],
            absent_policy: AbsentPolicy::Preserve,
        }
    }
}

impl ViewSettings {
    pub fn postseason() -> Vec<SeasonType> {
        SeasonType::ALL
            .into_iter()
            .filter(|st| st.is_postseason())
            .collect()
    }

    pub fn load(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<ViewSettings>(&raw) {
            Ok(settings) if settings.version == SETTINGS_VERSION => settings,
            Ok(settings) => {
                warn!(found = settings.version, "view settings version changed, using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable view settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).ok();
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self).context("serialize view settings")?;
        fs::write(&tmp, json).context("write view settings")?;
        fs::rename(&tmp, path).context("swap view settings")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_n_counts_back_from_current() {
        let current = Season::from_start_year(2024);
        let seasons = SeasonScope::LastN { years: 3 }.seasons(current).unwrap();
        let labels = seasons.iter().map(|s| s.label()).collect::<Vec<_>>();
        assert_eq!(labels, ["2024-25", "2023-24", "2022-23"]);
        assert_eq!(SeasonScope::Career.seasons(current), None);
    }

    #[test]
    fn scope_labels_name_the_seasons() {
        let scope = SeasonScope::Seasons {
            seasons: vec![Season::from_start_year(2021), Season::from_start_year(2023)],
        };
        assert_eq!(scope.label(), "2021-22, 2023-24");
        assert_eq!(SeasonScope::LastN { years: 2 }.label(), "last 2 seasons");
    }

    #[test]
    fn settings_roundtrip_through_disk() {
        let dir = std::env::temp_dir().join(format!("hoops_settings_{}", std::process::id()));
        let path = dir.join(SETTINGS_FILE);
        let settings = ViewSettings {
            mode: StatMode::per_100_possessions(),
            season_scope: SeasonScope::Seasons {
                seasons: vec![Season::from_start_year(2022)],
            },
            season_types: ViewSettings::postseason(),
            absent_policy: AbsentPolicy::TreatAsZero,
            ..ViewSettings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(ViewSettings::load(&path), settings);
        let _ = fs::remove_dir_all(dir);
    }
}
