use std::fs;
use std::path::PathBuf;

use serde_json::{Value, json};

use hoops_ingest::column_spec::{ColumnSet, Scaling, TierSource};
use hoops_ingest::error::ConfigError;
use hoops_ingest::record::EntityKind;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn baselines() -> Vec<Value> {
    vec![
        json!({"name": "games", "scaling": "games", "sources": [
            {"tier": "player", "endpoint": "leaguedashplayerstats",
             "result_set": "LeagueDashPlayerStats", "field": "GP"}
        ]}),
        json!({"name": "minutes", "scaling": "minutes", "sources": [
            {"tier": "player", "endpoint": "leaguedashplayerstats",
             "result_set": "LeagueDashPlayerStats", "field": "MIN"}
        ]}),
    ]
}

fn load_with(extra: Value) -> anyhow::Result<ColumnSet> {
    let mut columns = baselines();
    columns.push(extra);
    let doc = json!({
        "categories": {
            "defender_distance": {
                "field": "CLOSE_DEF_DIST_RANGE",
                "buckets": {"open": ["4-6 Feet - Open", "6+ Feet - Wide Open"]}
            }
        },
        "columns": columns,
    });
    ColumnSet::from_json(&doc.to_string())
}

fn config_error(result: anyhow::Result<ColumnSet>) -> ConfigError {
    let err = result.expect_err("spec should be rejected");
    err.downcast_ref::<ConfigError>()
        .cloned()
        .unwrap_or_else(|| panic!("expected a config error, got {err:#}"))
}

#[test]
fn shipped_column_spec_validates() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/columns.json");
    let spec = ColumnSet::load(&path).expect("shipped spec should load");
    assert_eq!(spec.games_column(), "games");
    assert_eq!(spec.minutes_column(), "minutes");
    assert_eq!(spec.possessions_column(), Some("possessions"));
    assert!(spec.lower_is_better("tov"));
    assert!(!spec.lower_is_better("ast"));

    let close_open = spec.column("close_open_fgm").expect("close open makes");
    let Some(TierSource::Player(source)) = close_open.source_for(EntityKind::Player) else {
        panic!("close open makes should have a player source");
    };
    assert_eq!(source.result_set, "ClosestDefenderShooting");
    assert_eq!(
        source.subtract.as_deref(),
        Some("ClosestDefender10ftPlusShooting")
    );
    assert!(spec.endpoints_for_tier(EntityKind::Player).contains(&"playerdashptshots"));
    assert!(spec.endpoints_for_tier(EntityKind::Team).contains(&"teamdashptshots"));
}

#[test]
fn fixture_spec_has_rollups_and_derived_stats() {
    let spec = ColumnSet::from_json(&read_fixture("columns_basic.json")).unwrap();
    let rollups = spec
        .rollup_columns()
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(rollups, vec!["tov"]);
    assert_eq!(spec.column("off_rating").unwrap().scaling, Scaling::Rate);
    let names = spec.stat_names();
    assert_eq!(names.last(), Some(&"fg3_pct"));
    assert!(names.contains(&"ts_pct"));
}

#[test]
fn rejects_unknown_endpoint() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "playercareerstats",
         "result_set": "SeasonTotalsRegularSeason", "field": "PTS"}
    ]})));
    assert!(matches!(err, ConfigError::UnknownEndpoint { ref endpoint, .. } if endpoint == "playercareerstats"));
}

#[test]
fn rejects_unknown_result_set() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "playerdashptshots",
         "result_set": "ClosestDefenderShootingTypo", "field": "FGM"}
    ]})));
    assert!(matches!(err, ConfigError::UnknownResultSet { .. }));
}

#[test]
fn rejects_season_type_literal_in_params() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "leaguedashplayerstats",
         "result_set": "LeagueDashPlayerStats", "field": "PTS",
         "params": {"SeasonType": "Playoffs"}}
    ]})));
    assert!(matches!(err, ConfigError::SeasonTypeLiteral { ref param, .. } if param == "SeasonType"));

    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "leaguedashplayerstats",
         "result_set": "LeagueDashPlayerStats", "field": "PTS",
         "params": {"Season": "2019-20"}}
    ]})));
    assert!(matches!(err, ConfigError::SeasonTypeLiteral { .. }));
}

#[test]
fn rejects_subtraction_that_is_not_nested() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "playerdashptshots",
         "result_set": "ClosestDefenderShooting", "subtract": "Overall", "field": "FGM"}
    ]})));
    assert!(matches!(err, ConfigError::NotASuperset { ref subset, .. } if subset == "Overall"));

    // Reversed direction: the superset cannot be subtracted from its subset.
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "playerdashptshots",
         "result_set": "ClosestDefender10ftPlusShooting",
         "subtract": "ClosestDefenderShooting", "field": "FGM"}
    ]})));
    assert!(matches!(err, ConfigError::NotASuperset { .. }));
}

#[test]
fn rejects_unknown_category_bucket() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "playerdashptshots",
         "result_set": "ClosestDefenderShooting", "field": "FGM",
         "filter": {"key": "defender_distance", "value": "smothered"}}
    ]})));
    assert!(matches!(err, ConfigError::UnknownCategory { ref value, .. } if value == "smothered"));
}

#[test]
fn rejects_tier_the_endpoint_does_not_serve() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "team", "endpoint": "playerdashptshots",
         "result_set": "Overall", "field": "FGM"}
    ]})));
    assert!(matches!(err, ConfigError::TierMismatch { .. }));
}

#[test]
fn rejects_unknown_param_and_blank_field() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "leaguedashplayerstats",
         "result_set": "LeagueDashPlayerStats", "field": "PTS",
         "params": {"PerMode": "PerGame"}}
    ]})));
    assert!(matches!(err, ConfigError::UnknownParam { ref param, .. } if param == "PerMode"));

    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "player", "endpoint": "leaguedashplayerstats",
         "result_set": "LeagueDashPlayerStats", "field": "  "}
    ]})));
    assert!(matches!(err, ConfigError::EmptyField { .. }));
}

#[test]
fn rejects_rollup_without_player_source() {
    let err = config_error(load_with(json!({"name": "x", "sources": [
        {"tier": "team_rollup"}
    ]})));
    assert!(matches!(err, ConfigError::RollupWithoutPlayerSource { .. }));
}

#[test]
fn rejects_missing_and_duplicate_baselines() {
    let doc = json!({"columns": [baselines()[1].clone()]});
    let err = config_error(ColumnSet::from_json(&doc.to_string()));
    assert_eq!(err, ConfigError::MissingBaseline("games"));

    let mut dup = baselines()[1].clone();
    dup["name"] = json!("minutes_again");
    let err = config_error(load_with(dup));
    assert_eq!(err, ConfigError::DuplicateBaseline("minutes"));
}

#[test]
fn rejects_duplicate_names_and_unknown_derived_inputs() {
    let err = config_error(load_with(baselines()[0].clone()));
    assert_eq!(err, ConfigError::DuplicateColumn("games".to_string()));

    let doc = json!({
        "columns": baselines(),
        "derived": [{"name": "points", "formula": {"kind": "points"}}],
    });
    let err = config_error(ColumnSet::from_json(&doc.to_string()));
    assert!(matches!(err, ConfigError::UnknownDerivedInput { ref input, .. } if input == "fg2m"));
}

#[test]
fn malformed_json_is_an_error_not_a_panic() {
    let err = ColumnSet::from_json("{\"columns\": [").unwrap_err();
    assert!(format!("{err:#}").contains("parse column spec json"));
}
