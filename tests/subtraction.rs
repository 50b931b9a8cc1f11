use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use hoops_ingest::column_spec::ColumnSet;
use hoops_ingest::extract::extract;
use hoops_ingest::fake_source::{ScriptedSource, SetSpec, response_body};
use hoops_ingest::fetch::{FanoutTargets, ResultSetFetcher};
use hoops_ingest::record::EntityKind;
use hoops_ingest::resolver::resolve;
use hoops_ingest::season::{Season, SeasonType};

const CURRY: i64 = 201939;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn shot_column(name: &str, field: &str, bucket: &str, subtract: bool) -> serde_json::Value {
    let mut source = json!({
        "tier": "player",
        "endpoint": "playerdashptshots",
        "result_set": "ClosestDefenderShooting",
        "field": field,
        "filter": {"key": "defender_distance", "value": bucket},
    });
    if subtract {
        source["subtract"] = json!("ClosestDefender10ftPlusShooting");
    }
    json!({"name": name, "sources": [source]})
}

fn shot_spec() -> ColumnSet {
    let doc = json!({
        "categories": {
            "defender_distance": {
                "field": "CLOSE_DEF_DIST_RANGE",
                "buckets": {
                    "contested": ["0-2 Feet - Very Tight", "2-4 Feet - Tight"],
                    "open": ["4-6 Feet - Open", "6+ Feet - Wide Open"]
                }
            }
        },
        "columns": [
            {"name": "games", "scaling": "games", "sources": [
                {"tier": "player", "endpoint": "leaguedashplayerstats",
                 "result_set": "LeagueDashPlayerStats", "field": "GP"}]},
            {"name": "minutes", "scaling": "minutes", "sources": [
                {"tier": "player", "endpoint": "leaguedashplayerstats",
                 "result_set": "LeagueDashPlayerStats", "field": "MIN"}]},
            shot_column("open_fg3m", "FG3M", "open", false),
            shot_column("close_open_fg3m", "FG3M", "open", true),
            shot_column("close_contested_fg3m", "FG3M", "contested", true),
            shot_column("close_open_fgm", "FGM", "open", true),
            shot_column("close_contested_fgm", "FGM", "contested", true),
        ],
    });
    ColumnSet::from_json(&doc.to_string()).expect("shot spec")
}

fn range_row(id: i64, range: &str, fgm: i64, fg3m: i64) -> Vec<serde_json::Value> {
    vec![json!(id), json!(range), json!(fgm), json!(fg3m)]
}

const RANGE_HEADERS: &[&str] = &["PLAYER_ID", "CLOSE_DEF_DIST_RANGE", "FGM", "FG3M"];

fn run(source: ScriptedSource, ids: &[i64]) -> hoops_ingest::extract::ExtractOutcome {
    let spec = shot_spec();
    let plan = resolve(&spec, EntityKind::Player, Season::from_start_year(2024), SeasonType::Regular);
    let targets = FanoutTargets {
        players: ids.to_vec(),
        teams: Vec::new(),
    };
    let mut fetcher = ResultSetFetcher::new(source, Duration::ZERO, 3);
    let fetched = plan
        .requests
        .iter()
        .map(|r| fetcher.fetch(r, &targets).expect("no exhaustion"))
        .collect::<Vec<_>>();
    extract(&plan, &fetched, ids)
}

#[test]
fn close_open_threes_are_all_open_minus_open_beyond_ten_feet() {
    let mut source = ScriptedSource::new();
    source.respond(
        "playerdashptshots",
        &[("PlayerID", "201939")],
        read_fixture("playerdashptshots_201939.json"),
    );
    let outcome = run(source, &[CURRY]);
    assert!(outcome.violations.is_empty());

    let values = &outcome.values[&CURRY];
    assert_eq!(values["open_fg3m"], Some(150.0));
    assert_eq!(values["close_open_fg3m"], Some(90.0));
    assert_eq!(values["close_contested_fg3m"], Some(100.0));
    assert_eq!(values["close_open_fgm"], Some(258.0));
    assert_eq!(values["close_contested_fgm"], Some(225.0));
}

#[test]
fn contested_and_open_buckets_read_different_rows() {
    let mut source = ScriptedSource::new();
    source.respond(
        "playerdashptshots",
        &[],
        response_body(&[
            SetSpec {
                name: "ClosestDefenderShooting",
                headers: RANGE_HEADERS,
                rows: vec![
                    range_row(1, "0-2 Feet - Very Tight", 10, 1),
                    range_row(1, "6+ Feet - Wide Open", 30, 20),
                ],
            },
            SetSpec {
                name: "ClosestDefender10ftPlusShooting",
                headers: RANGE_HEADERS,
                rows: vec![range_row(1, "6+ Feet - Wide Open", 12, 12)],
            },
        ]),
    );
    let outcome = run(source, &[1]);
    let values = &outcome.values[&1];
    assert_eq!(values["close_contested_fg3m"], Some(1.0));
    assert_eq!(values["close_open_fg3m"], Some(8.0));
    assert_ne!(values["close_contested_fgm"], values["close_open_fgm"]);
}

#[test]
fn entity_missing_from_subset_keeps_the_full_superset() {
    let mut source = ScriptedSource::new();
    source.respond(
        "playerdashptshots",
        &[],
        response_body(&[
            SetSpec {
                name: "ClosestDefenderShooting",
                headers: RANGE_HEADERS,
                rows: vec![range_row(5, "4-6 Feet - Open", 9, 4)],
            },
            SetSpec {
                name: "ClosestDefender10ftPlusShooting",
                headers: RANGE_HEADERS,
                rows: Vec::new(),
            },
        ]),
    );
    let outcome = run(source, &[5]);
    assert_eq!(outcome.values[&5]["close_open_fgm"], Some(9.0));
    assert_eq!(outcome.values[&5]["close_open_fg3m"], Some(4.0));
    // Measured, but no contested rows at all.
    assert_eq!(outcome.values[&5]["close_contested_fgm"], Some(0.0));
}

#[test]
fn negative_difference_is_a_violation_not_a_value() {
    let mut source = ScriptedSource::new();
    source.respond(
        "playerdashptshots",
        &[],
        response_body(&[
            SetSpec {
                name: "ClosestDefenderShooting",
                headers: RANGE_HEADERS,
                rows: vec![range_row(8, "4-6 Feet - Open", 3, 1)],
            },
            SetSpec {
                name: "ClosestDefender10ftPlusShooting",
                headers: RANGE_HEADERS,
                rows: vec![range_row(8, "4-6 Feet - Open", 5, 1)],
            },
        ]),
    );
    let outcome = run(source, &[8]);
    assert_eq!(outcome.values[&8]["close_open_fgm"], None);
    assert_eq!(outcome.values[&8]["close_open_fg3m"], Some(0.0));
    assert_eq!(outcome.violations.len(), 1);
    let violation = &outcome.violations[0];
    assert_eq!(violation.entity_id, 8);
    assert_eq!(violation.column, "close_open_fgm");
    assert_eq!(violation.superset_value, 3.0);
    assert_eq!(violation.subset_value, 5.0);
}

#[test]
fn unanswered_entities_stay_absent_rather_than_zero() {
    let mut source = ScriptedSource::new();
    source.respond(
        "playerdashptshots",
        &[("PlayerID", "201939")],
        read_fixture("playerdashptshots_201939.json"),
    );
    // 2544 gets a 400 from the scripted source.
    let outcome = run(source, &[CURRY, 2544]);
    assert_eq!(outcome.values[&2544]["close_open_fg3m"], None);
    assert_eq!(outcome.values[&2544]["open_fg3m"], None);
    assert_eq!(outcome.values[&CURRY]["close_open_fg3m"], Some(90.0));
}
