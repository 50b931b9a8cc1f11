use crate::record::EntityKind;
use crate::season::{Season, SeasonType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fanout {
    League,
    PerTeam,
    PerPlayer,
}

#[derive(Debug)]
pub struct EndpointDef {
    pub id: &'static str,
    pub fanout: Fanout,
    pub tiers: &'static [EntityKind],
    pub season_type_param: &'static str,
    pub entity_param: Option<&'static str>,
    pub defaults: &'static [(&'static str, &'static str)],
    pub overridable: &'static [&'static str],
    pub result_sets: &'static [&'static str],
    /// `(subset, superset)` pairs: every row in `subset` is also counted in
    /// `superset` for the same entity and category.
    pub nested: &'static [(&'static str, &'static str)],
    pub min_season: Option<i32>,
    pub season_types: &'static [SeasonType],
}

impl EndpointDef {
    pub fn serves(&self, kind: EntityKind) -> bool {
        self.tiers.contains(&kind)
    }

    pub fn has_result_set(&self, name: &str) -> bool {
        self.result_sets.contains(&name)
    }

    pub fn is_nested(&self, subset: &str, superset: &str) -> bool {
        self.nested
            .iter()
            .any(|(sub, sup)| *sub == subset && *sup == superset)
    }

    pub fn available_for(&self, season: Season, season_type: SeasonType) -> bool {
        if let Some(min) = self.min_season
            && season.start_year() < min
        {
            return false;
        }
        self.season_types.contains(&season_type)
    }

    pub fn accepts_param(&self, name: &str) -> bool {
        self.overridable.contains(&name)
    }
}

pub const PLAYER_ROLLUP: &str = "player_rollup";
pub const ROSTER: &str = "roster";

const ALL_TYPES: &[SeasonType] = &SeasonType::ALL;
const TRACKING_TYPES: &[SeasonType] = &[
    SeasonType::Regular,
    SeasonType::Playoffs,
    SeasonType::PlayIn,
    SeasonType::PreSeason,
];

const DASH_DEFAULTS: &[(&str, &str)] = &[
    ("LeagueID", "00"),
    ("MeasureType", "Base"),
    ("PerMode", "Totals"),
    ("PlusMinus", "N"),
    ("PaceAdjust", "N"),
    ("Rank", "N"),
    ("LastNGames", "0"),
    ("Month", "0"),
    ("OpponentTeamID", "0"),
    ("Period", "0"),
    ("TeamID", "0"),
    ("DateFrom", ""),
    ("DateTo", ""),
    ("GameSegment", ""),
    ("Location", ""),
    ("Outcome", ""),
    ("SeasonSegment", ""),
    ("VsConference", ""),
    ("VsDivision", ""),
];

const HUSTLE_DEFAULTS: &[(&str, &str)] = &[
    ("LeagueID", "00"),
    ("PerMode", "Totals"),
    ("TeamID", "0"),
    ("DateFrom", ""),
    ("DateTo", ""),
];

const TRACKING_DEFAULTS: &[(&str, &str)] = &[
    ("LeagueID", "00"),
    ("PerMode", "Totals"),
    ("PtMeasureType", "SpeedDistance"),
    ("LastNGames", "0"),
    ("Month", "0"),
    ("OpponentTeamID", "0"),
    ("TeamID", "0"),
];

const SHOT_DASH_DEFAULTS: &[(&str, &str)] = &[
    ("LeagueID", "00"),
    ("PerMode", "Totals"),
    ("LastNGames", "0"),
    ("Month", "0"),
    ("OpponentTeamID", "0"),
    ("Period", "0"),
    ("TeamID", "0"),
];

const SHOT_DASH_SETS: &[&str] = &[
    "Overall",
    "GeneralShooting",
    "ShotClockShooting",
    "DribbleShooting",
    "ClosestDefenderShooting",
    "ClosestDefender10ftPlusShooting",
    "TouchTimeShooting",
];

const SHOT_DASH_NESTED: &[(&str, &str)] =
    &[("ClosestDefender10ftPlusShooting", "ClosestDefenderShooting")];

static CATALOG: &[EndpointDef] = &[
    EndpointDef {
        id: "leaguedashplayerstats",
        fanout: Fanout::League,
        tiers: &[EntityKind::Player],
        season_type_param: "SeasonType",
        entity_param: None,
        defaults: DASH_DEFAULTS,
        overridable: &["MeasureType"],
        result_sets: &["LeagueDashPlayerStats"],
        nested: &[],
        min_season: None,
        season_types: ALL_TYPES,
    },
    EndpointDef {
        id: "leaguedashteamstats",
        fanout: Fanout::League,
        tiers: &[EntityKind::Team],
        season_type_param: "SeasonType",
        entity_param: None,
        defaults: DASH_DEFAULTS,
        overridable: &["MeasureType"],
        result_sets: &["LeagueDashTeamStats"],
        nested: &[],
        min_season: None,
        season_types: ALL_TYPES,
    },
    EndpointDef {
        id: "leaguehustlestatsplayer",
        fanout: Fanout::League,
        tiers: &[EntityKind::Player],
        season_type_param: "SeasonType",
        entity_param: None,
        defaults: HUSTLE_DEFAULTS,
        overridable: &[],
        result_sets: &["HustleStatsPlayer"],
        nested: &[],
        min_season: Some(2015),
        season_types: TRACKING_TYPES,
    },
    EndpointDef {
        id: "leaguehustlestatsteam",
        fanout: Fanout::League,
        tiers: &[EntityKind::Team],
        season_type_param: "SeasonType",
        entity_param: None,
        defaults: HUSTLE_DEFAULTS,
        overridable: &[],
        result_sets: &["HustleStatsTeam"],
        nested: &[],
        min_season: Some(2015),
        season_types: TRACKING_TYPES,
    },
    EndpointDef {
        id: "leaguedashptstats",
        fanout: Fanout::League,
        tiers: &[EntityKind::Player, EntityKind::Team],
        season_type_param: "SeasonType",
        entity_param: Some("PlayerOrTeam"),
        defaults: TRACKING_DEFAULTS,
        overridable: &["PtMeasureType"],
        result_sets: &["LeagueDashPtStats"],
        nested: &[],
        min_season: Some(2013),
        season_types: TRACKING_TYPES,
    },
    EndpointDef {
        id: "playerdashptshots",
        fanout: Fanout::PerPlayer,
        tiers: &[EntityKind::Player],
        season_type_param: "SeasonType",
        entity_param: None,
        defaults: SHOT_DASH_DEFAULTS,
        overridable: &[],
        result_sets: SHOT_DASH_SETS,
        nested: SHOT_DASH_NESTED,
        min_season: Some(2013),
        season_types: TRACKING_TYPES,
    },
    EndpointDef {
        id: "teamdashptshots",
        fanout: Fanout::PerTeam,
        tiers: &[EntityKind::Team],
        season_type_param: "SeasonType",
        entity_param: None,
        defaults: SHOT_DASH_DEFAULTS,
        overridable: &[],
        result_sets: SHOT_DASH_SETS,
        nested: SHOT_DASH_NESTED,
        min_season: Some(2013),
        season_types: TRACKING_TYPES,
    },
];

pub fn lookup(id: &str) -> Option<&'static EndpointDef> {
    CATALOG.iter().find(|def| def.id == id)
}

pub fn catalog() -> &'static [EndpointDef] {
    CATALOG
}

pub fn roster_endpoint(kind: EntityKind) -> &'static EndpointDef {
    match kind {
        EntityKind::Player => &CATALOG[0],
        EntityKind::Team => &CATALOG[1],
    }
}

/// True for parameter names that carry a season or season type. Those are
/// always supplied by the pass being processed, never by configuration.
pub fn is_season_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "season" || lower.contains("seasontype") || lower.contains("season_type")
}
