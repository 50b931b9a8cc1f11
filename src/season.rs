use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonType {
    Regular,
    Playoffs,
    PlayIn,
    PreSeason,
    SummerLeague,
}

impl SeasonType {
    pub const ALL: [SeasonType; 5] = [
        SeasonType::Regular,
        SeasonType::Playoffs,
        SeasonType::PlayIn,
        SeasonType::PreSeason,
        SeasonType::SummerLeague,
    ];

    pub fn api_name(self) -> &'static str {
        match self {
            SeasonType::Regular => "Regular Season",
            SeasonType::Playoffs => "Playoffs",
            SeasonType::PlayIn => "PlayIn",
            SeasonType::PreSeason => "Pre Season",
            SeasonType::SummerLeague => "Summer League",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SeasonType::Regular => "regular",
            SeasonType::Playoffs => "playoffs",
            SeasonType::PlayIn => "play_in",
            SeasonType::PreSeason => "pre_season",
            SeasonType::SummerLeague => "summer_league",
        }
    }

    pub fn code(self) -> i64 {
        match self {
            SeasonType::Regular => 1,
            SeasonType::Playoffs => 2,
            SeasonType::PlayIn => 3,
            SeasonType::PreSeason => 4,
            SeasonType::SummerLeague => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.code() == code)
    }

    pub fn is_postseason(self) -> bool {
        matches!(self, SeasonType::Playoffs | SeasonType::PlayIn)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match norm.as_str() {
            "regular" | "regularseason" | "rs" => Some(SeasonType::Regular),
            "playoffs" | "playoff" | "po" => Some(SeasonType::Playoffs),
            "playin" => Some(SeasonType::PlayIn),
            "preseason" => Some(SeasonType::PreSeason),
            "summerleague" | "summer" => Some(SeasonType::SummerLeague),
            _ => None,
        }
    }
}

impl fmt::Display for SeasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Season {
    start_year: i32,
}

impl Season {
    pub fn from_start_year(start_year: i32) -> Self {
        Self { start_year }
    }

    pub fn start_year(self) -> i32 {
        self.start_year
    }

    pub fn end_year(self) -> i32 {
        self.start_year + 1
    }

    pub fn previous(self) -> Self {
        Self::from_start_year(self.start_year - 1)
    }

    pub fn label(self) -> String {
        format!("{}-{:02}", self.start_year, self.end_year().rem_euclid(100))
    }

    /// Seasons start in October; January through September belong to the
    /// season that started the previous calendar year.
    pub fn containing(date: NaiveDate) -> Self {
        if date.month() >= 10 {
            Self::from_start_year(date.year())
        } else {
            Self::from_start_year(date.year() - 1)
        }
    }

    pub fn current() -> Self {
        Self::containing(chrono::Local::now().date_naive())
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Season {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (start, end) = raw
            .split_once('-')
            .ok_or_else(|| anyhow!("season `{raw}` is not in YYYY-YY form"))?;
        let start_year = start
            .parse::<i32>()
            .map_err(|_| anyhow!("season `{raw}` has a bad start year"))?;
        let end_suffix = end
            .parse::<i32>()
            .map_err(|_| anyhow!("season `{raw}` has a bad end year"))?;
        if (start_year + 1).rem_euclid(100) != end_suffix.rem_euclid(100) {
            return Err(anyhow!("season `{raw}` does not span consecutive years"));
        }
        Ok(Self::from_start_year(start_year))
    }
}

impl TryFrom<String> for Season {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Season> for String {
    fn from(value: Season) -> Self {
        value.label()
    }
}
