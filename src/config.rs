use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::season::{Season, SeasonType};

const APP_DIR: &str = "hoops_ingest";
pub const DEFAULT_API_BASE_URL: &str = "https://stats.nba.com/stats";
pub const DEFAULT_COLUMNS_FILE: &str = "config/columns.json";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub db_path: PathBuf,
    pub columns_file: PathBuf,
    pub api_base_url: String,
    pub call_delay: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub seasons: Vec<Season>,
    pub season_types: Vec<SeasonType>,
    pub response_cache_max_age: Duration,
    pub absent_as_zero: bool,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| {
            non_empty(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let db_path = non_empty("HOOPS_DB_PATH")
            .map(PathBuf::from)
            .or_else(default_db_path)
            .unwrap_or_else(|| PathBuf::from("hoops.sqlite"));
        let columns_file = non_empty("HOOPS_COLUMNS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COLUMNS_FILE));
        let api_base_url = non_empty("HOOPS_API_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let seasons = non_empty("HOOPS_SEASONS")
            .map(|raw| parse_seasons(&raw))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| vec![Season::current()]);
        let season_types = non_empty("HOOPS_SEASON_TYPES")
            .map(|raw| parse_season_types(&raw))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| SeasonType::ALL.to_vec());

        let absent_as_zero = non_empty("HOOPS_ABSENT_AS_ZERO")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            db_path,
            columns_file,
            api_base_url,
            call_delay: Duration::from_millis(number("HOOPS_CALL_DELAY_MS", 3000)),
            timeout: Duration::from_secs(number("HOOPS_TIMEOUT_SECS", 20).max(1)),
            failure_threshold: number("HOOPS_FAILURE_THRESHOLD", 3).clamp(1, 100) as u32,
            seasons,
            season_types,
            response_cache_max_age: Duration::from_secs(
                number("HOOPS_RESPONSE_CACHE_HOURS", 12) * 3600,
            ),
            absent_as_zero,
        }
    }
}

/// Comma separated `YYYY-YY` labels; a `A..B` range of labels expands to
/// every season in between. Unparseable entries are dropped.
pub fn parse_seasons(raw: &str) -> Vec<Season> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((from, to)) = part.split_once("..") {
            let (Ok(from), Ok(to)) = (from.parse::<Season>(), to.parse::<Season>()) else {
                continue;
            };
            for year in from.start_year()..=to.start_year() {
                out.push(Season::from_start_year(year));
            }
        } else if let Ok(season) = part.parse::<Season>() {
            out.push(season);
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

pub fn parse_season_types(raw: &str) -> Vec<SeasonType> {
    let mut out = Vec::new();
    for st in raw.split(',').filter_map(SeasonType::parse) {
        if !out.contains(&st) {
            out.push(st);
        }
    }
    out
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("hoops.sqlite"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_values_override_defaults_and_are_clamped() {
        let cfg = IngestConfig::from_lookup(|key| match key {
            "HOOPS_DB_PATH" => Some("/tmp/x.sqlite".to_string()),
            "HOOPS_CALL_DELAY_MS" => Some("0".to_string()),
            "HOOPS_FAILURE_THRESHOLD" => Some("0".to_string()),
            "HOOPS_SEASONS" => Some("2022-23..2024-25".to_string()),
            "HOOPS_SEASON_TYPES" => Some("Playoffs,PlayIn,bogus".to_string()),
            "HOOPS_API_BASE_URL" => Some("http://localhost:9/".to_string()),
            _ => None,
        });
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(cfg.call_delay, Duration::ZERO);
        assert_eq!(cfg.failure_threshold, 1);
        assert_eq!(cfg.seasons.len(), 3);
        assert_eq!(
            cfg.season_types,
            vec![SeasonType::Playoffs, SeasonType::PlayIn]
        );
        assert_eq!(cfg.api_base_url, "http://localhost:9");
        assert!(!cfg.absent_as_zero);
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = IngestConfig::from_lookup(|_| None);
        assert_eq!(cfg.call_delay, Duration::from_millis(3000));
        assert_eq!(cfg.timeout, Duration::from_secs(20));
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.season_types.len(), 5);
        assert_eq!(cfg.columns_file, PathBuf::from(DEFAULT_COLUMNS_FILE));
    }
}
