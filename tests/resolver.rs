use std::fs;
use std::path::PathBuf;

use serde_json::json;

use hoops_ingest::column_spec::ColumnSet;
use hoops_ingest::endpoints::{self, Fanout};
use hoops_ingest::record::EntityKind;
use hoops_ingest::resolver::{resolve, resolve_for_endpoint, roster_request};
use hoops_ingest::season::{Season, SeasonType};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn basic_spec() -> ColumnSet {
    ColumnSet::from_json(&read_fixture("columns_basic.json")).expect("fixture spec")
}

fn season() -> Season {
    Season::from_start_year(2024)
}

#[test]
fn columns_sharing_a_query_share_one_request() {
    let spec = basic_spec();
    let plan = resolve(&spec, EntityKind::Player, season(), SeasonType::Regular);

    // Base box score plus the Advanced measure type.
    assert_eq!(plan.requests.len(), 2);
    assert!(plan.requests.iter().all(|r| r.endpoint == "leaguedashplayerstats"));
    let measure_types = plan
        .requests
        .iter()
        .map(|r| r.param("MeasureType").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(measure_types, vec!["Base", "Advanced"]);

    let request_of = |name: &str| {
        plan.columns
            .iter()
            .find(|c| c.column == name)
            .map(|c| c.request)
            .unwrap()
    };
    assert_eq!(request_of("fg3m"), request_of("fg3a"));
    assert_eq!(request_of("possessions"), request_of("off_rating"));
    assert_ne!(request_of("fg3m"), request_of("possessions"));
    assert!(plan.rollups.is_empty());
}

#[test]
fn season_and_season_type_come_from_the_pass() {
    let spec = basic_spec();
    let regular = resolve(&spec, EntityKind::Player, season(), SeasonType::Regular);
    let playoffs = resolve(&spec, EntityKind::Player, season(), SeasonType::Playoffs);
    let play_in = resolve(&spec, EntityKind::Player, season(), SeasonType::PlayIn);

    for (plan, expected) in [
        (&regular, "Regular Season"),
        (&playoffs, "Playoffs"),
        (&play_in, "PlayIn"),
    ] {
        for request in &plan.requests {
            assert_eq!(request.param("SeasonType"), Some(expected));
            assert_eq!(request.param("Season"), Some("2024-25"));
        }
    }
    assert_ne!(regular.requests[0], playoffs.requests[0]);
    assert_ne!(playoffs.requests[0], play_in.requests[0]);
}

#[test]
fn team_plan_keeps_rollups_for_the_rollup_unit_only() {
    let spec = basic_spec();
    let full = resolve(&spec, EntityKind::Team, season(), SeasonType::Regular);
    assert_eq!(full.rollups, vec!["tov".to_string()]);
    assert_eq!(full.requests.len(), 1);
    assert_eq!(full.requests[0].endpoint, "leaguedashteamstats");

    let box_unit = resolve_for_endpoint(
        &spec,
        EntityKind::Team,
        "leaguedashteamstats",
        season(),
        SeasonType::Regular,
    );
    assert!(box_unit.rollups.is_empty());
    assert!(!box_unit.columns.is_empty());

    let rollup_unit = resolve_for_endpoint(
        &spec,
        EntityKind::Team,
        endpoints::PLAYER_ROLLUP,
        season(),
        SeasonType::Regular,
    );
    assert!(rollup_unit.columns.is_empty());
    assert_eq!(rollup_unit.rollups, vec!["tov".to_string()]);
}

#[test]
fn unavailable_endpoints_are_reported_not_requested() {
    let doc = json!({"columns": [
        {"name": "games", "scaling": "games", "sources": [
            {"tier": "player", "endpoint": "leaguedashplayerstats",
             "result_set": "LeagueDashPlayerStats", "field": "GP"}]},
        {"name": "minutes", "scaling": "minutes", "sources": [
            {"tier": "player", "endpoint": "leaguedashplayerstats",
             "result_set": "LeagueDashPlayerStats", "field": "MIN"}]},
        {"name": "deflections", "sources": [
            {"tier": "player", "endpoint": "leaguehustlestatsplayer",
             "result_set": "HustleStatsPlayer", "field": "DEFLECTIONS"}]},
    ]});
    let spec = ColumnSet::from_json(&doc.to_string()).unwrap();

    let old = resolve(&spec, EntityKind::Player, Season::from_start_year(2012), SeasonType::Regular);
    assert_eq!(old.unavailable, vec!["deflections".to_string()]);
    assert_eq!(old.requests.len(), 1);

    let summer = resolve(&spec, EntityKind::Player, season(), SeasonType::SummerLeague);
    assert_eq!(summer.unavailable, vec!["deflections".to_string()]);

    let recent = resolve(&spec, EntityKind::Player, season(), SeasonType::Regular);
    assert!(recent.unavailable.is_empty());
    assert_eq!(recent.requests.len(), 2);
}

#[test]
fn tracking_requests_carry_the_tier() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/columns.json");
    let spec = ColumnSet::load(&path).unwrap();
    let player = resolve_for_endpoint(
        &spec,
        EntityKind::Player,
        "leaguedashptstats",
        season(),
        SeasonType::Playoffs,
    );
    assert!(!player.requests.is_empty());
    for request in &player.requests {
        assert_eq!(request.param("PlayerOrTeam"), Some("Player"));
    }

    let shots = resolve_for_endpoint(
        &spec,
        EntityKind::Player,
        "playerdashptshots",
        season(),
        SeasonType::Regular,
    );
    // Every shot-dashboard column rides the same per-player call.
    assert_eq!(shots.requests.len(), 1);
    assert_eq!(shots.requests[0].fanout, Fanout::PerPlayer);
    assert!(shots.columns.iter().any(|c| c.source.subtract.is_some()));
    assert!(shots.columns.iter().all(|c| c.filter.is_some()));
}

#[test]
fn roster_requests_use_league_box_scores() {
    let players = roster_request(EntityKind::Player, season(), SeasonType::PlayIn);
    assert_eq!(players.endpoint, "leaguedashplayerstats");
    assert_eq!(players.param("SeasonType"), Some("PlayIn"));
    assert_eq!(players.param("MeasureType"), Some("Base"));

    let teams = roster_request(EntityKind::Team, season(), SeasonType::Regular);
    assert_eq!(teams.endpoint, "leaguedashteamstats");
    assert_eq!(teams.kind, EntityKind::Team);
}
