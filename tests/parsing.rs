use std::fs;
use std::path::PathBuf;

use hoops_ingest::error::FetchError;
use hoops_ingest::fetch::{Row, parse_response};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn rows(name: &str, set: usize) -> Vec<Row> {
    let sets = parse_response(&read_fixture(name)).expect("fixture should parse");
    let set = &sets[set];
    set.row_set
        .iter()
        .map(|values| Row::from_pairs(set.headers.iter().cloned().zip(values.iter().cloned())))
        .collect()
}

#[test]
fn parses_league_player_box_scores() {
    let sets = parse_response(&read_fixture("leaguedashplayerstats.json")).unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].name, "LeagueDashPlayerStats");

    let rows = rows("leaguedashplayerstats.json", 0);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id("PLAYER_ID"), Some(201939));
    assert_eq!(rows[0].text("PLAYER_NAME").as_deref(), Some("Stephen Curry"));
    assert_eq!(rows[0].number("MIN"), Some(2252.4));
    assert_eq!(rows[0].id("TEAM_ID"), Some(1610612744));
    // Null percentages are absent, not zero.
    assert_eq!(rows[2].number("FG_PCT"), None);
    assert_eq!(rows[2].number("FGA"), Some(0.0));
}

#[test]
fn parses_shot_dashboard_result_sets() {
    let sets = parse_response(&read_fixture("playerdashptshots_201939.json")).unwrap();
    let names = sets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
    assert!(names.contains(&"ClosestDefenderShooting"));
    assert!(names.contains(&"ClosestDefender10ftPlusShooting"));

    let closest = names
        .iter()
        .position(|n| *n == "ClosestDefenderShooting")
        .unwrap();
    let rows = rows("playerdashptshots_201939.json", closest);
    assert_eq!(rows.len(), 4);
    assert_eq!(
        rows[3].text("CLOSE_DEF_DIST_RANGE").as_deref(),
        Some("6+ Feet - Wide Open")
    );
    assert_eq!(rows[3].number("FG3M"), Some(50.0));
}

#[test]
fn numbers_and_ids_may_arrive_as_strings() {
    let body = r#"{"resultSets":[{"name":"X","headers":["TEAM_ID","MIN"],"rowSet":[["1610612744"," 48.5 "]]}]}"#;
    let sets = parse_response(body).unwrap();
    let row = Row::from_pairs(sets[0].headers.iter().cloned().zip(sets[0].row_set[0].clone()));
    assert_eq!(row.id("TEAM_ID"), Some(1610612744));
    assert_eq!(row.number("MIN"), Some(48.5));
    assert_eq!(row.number("MISSING"), None);
}

#[test]
fn bodies_without_result_sets_are_decode_errors() {
    assert!(matches!(
        parse_response(r#"{"message":"An error has occurred."}"#),
        Err(FetchError::Decode(_))
    ));
    assert!(matches!(parse_response("not json"), Err(FetchError::Decode(_))));
}
