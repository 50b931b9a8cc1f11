use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::record::{EntityId, EntityKind, RawStatRecord, RosterEntry, StatValues};
use crate::season::{Season, SeasonType};

pub const EDITABLE_FIELDS: &[&str] = &[
    "height_inches",
    "weight_lbs",
    "wingspan_inches",
    "jersey_number",
    "notes",
];

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn upsert_roster(
        &mut self,
        season: Season,
        season_type: SeasonType,
        entries: &[RosterEntry],
    ) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().context("begin roster transaction")?;
        for e in entries {
            tx.execute(
                r#"
                INSERT INTO entities (kind, entity_id, name, abbreviation, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(kind, entity_id) DO UPDATE SET
                    name = excluded.name,
                    abbreviation = COALESCE(excluded.abbreviation, entities.abbreviation),
                    updated_at = excluded.updated_at
                "#,
                params![e.kind.code(), e.entity_id, e.name, e.abbreviation, now],
            )
            .context("upsert entity")?;
            tx.execute(
                r#"
                INSERT INTO entity_seasons (kind, entity_id, season, season_type, team_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(kind, entity_id, season, season_type) DO UPDATE SET
                    team_id = excluded.team_id
                "#,
                params![
                    e.kind.code(),
                    e.entity_id,
                    season.label(),
                    season_type.code(),
                    e.team_id
                ],
            )
            .context("upsert entity season")?;
        }
        tx.commit().context("commit roster transaction")?;
        Ok(entries.len())
    }

    pub fn roster(
        &self,
        kind: EntityKind,
        season: Season,
        season_type: SeasonType,
    ) -> Result<Vec<RosterEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT e.entity_id, e.name, s.team_id, e.abbreviation
                FROM entity_seasons s
                JOIN entities e ON e.kind = s.kind AND e.entity_id = s.entity_id
                WHERE s.kind = ?1 AND s.season = ?2 AND s.season_type = ?3
                ORDER BY e.entity_id ASC
                "#,
            )
            .context("prepare roster query")?;
        let rows = stmt
            .query_map(
                params![kind.code(), season.label(), season_type.code()],
                |row| {
                    Ok(RosterEntry {
                        kind,
                        entity_id: row.get(0)?,
                        name: row.get(1)?,
                        team_id: row.get(2)?,
                        abbreviation: row.get(3)?,
                    })
                },
            )
            .context("query roster")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode roster row")?);
        }
        Ok(out)
    }

    pub fn roster_ids(
        &self,
        kind: EntityKind,
        season: Season,
        season_type: SeasonType,
    ) -> Result<Vec<EntityId>> {
        Ok(self
            .roster(kind, season, season_type)?
            .into_iter()
            .map(|e| e.entity_id)
            .collect())
    }

    pub fn write_values(
        &mut self,
        kind: EntityKind,
        season: Season,
        season_type: SeasonType,
        values: &BTreeMap<EntityId, StatValues>,
    ) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let label = season.label();
        let tx = self.conn.transaction().context("begin values transaction")?;
        let mut written = 0usize;
        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO stat_values (kind, entity_id, season, season_type, stat, value, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(kind, entity_id, season, season_type, stat) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                )
                .context("prepare value upsert")?;
            for (id, stats) in values {
                for (stat, value) in stats {
                    stmt.execute(params![
                        kind.code(),
                        id,
                        label,
                        season_type.code(),
                        stat,
                        value,
                        now
                    ])
                    .context("upsert stat value")?;
                    written += 1;
                }
            }
        }
        tx.commit().context("commit values transaction")?;
        Ok(written)
    }

    pub fn load_records(
        &self,
        kind: EntityKind,
        seasons: Option<&[Season]>,
        season_types: &[SeasonType],
    ) -> Result<Vec<RawStatRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT entity_id, season, season_type, stat, value
                FROM stat_values
                WHERE kind = ?1
                ORDER BY entity_id ASC, season ASC, season_type ASC
                "#,
            )
            .context("prepare load values query")?;
        let rows = stmt
            .query_map(params![kind.code()], |row| {
                Ok((
                    row.get::<_, EntityId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            })
            .context("query load values")?;

        let mut grouped: BTreeMap<(EntityId, Season, SeasonType), StatValues> = BTreeMap::new();
        for row in rows {
            let (id, season_label, st_code, stat, value) = row.context("decode value row")?;
            let season: Season = season_label
                .parse()
                .with_context(|| format!("stored season {season_label}"))?;
            let Some(season_type) = SeasonType::from_code(st_code) else {
                return Err(anyhow!("stored season type code {st_code} is unknown"));
            };
            if !season_types.contains(&season_type) {
                continue;
            }
            if let Some(allowed) = seasons
                && !allowed.contains(&season)
            {
                continue;
            }
            grouped
                .entry((id, season, season_type))
                .or_default()
                .insert(stat, value);
        }
        Ok(grouped
            .into_iter()
            .map(|((entity_id, season, season_type), values)| RawStatRecord {
                kind,
                entity_id,
                season,
                season_type,
                values,
            })
            .collect())
    }

    pub fn rollup_team_values(
        &self,
        season: Season,
        season_type: SeasonType,
        stats: &[String],
    ) -> Result<BTreeMap<EntityId, StatValues>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT s.team_id, v.stat, SUM(v.value)
                FROM stat_values v
                JOIN entity_seasons s
                  ON s.kind = v.kind AND s.entity_id = v.entity_id
                 AND s.season = v.season AND s.season_type = v.season_type
                WHERE v.kind = ?1 AND v.season = ?2 AND v.season_type = ?3
                  AND s.team_id IS NOT NULL
                GROUP BY s.team_id, v.stat
                "#,
            )
            .context("prepare rollup query")?;
        let rows = stmt
            .query_map(
                params![
                    EntityKind::Player.code(),
                    season.label(),
                    season_type.code()
                ],
                |row| {
                    Ok((
                        row.get::<_, EntityId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )
            .context("query rollup")?;

        let mut out: BTreeMap<EntityId, StatValues> = BTreeMap::new();
        for row in rows {
            let (team_id, stat, sum) = row.context("decode rollup row")?;
            if stats.contains(&stat) {
                out.entry(team_id).or_default().insert(stat, sum);
            }
        }
        for values in out.values_mut() {
            for stat in stats {
                values.entry(stat.clone()).or_insert(None);
            }
        }
        Ok(out)
    }

    pub fn entity_names(&self, kind: EntityKind) -> Result<HashMap<EntityId, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id, name FROM entities WHERE kind = ?1")
            .context("prepare entity names query")?;
        let rows = stmt
            .query_map(params![kind.code()], |row| {
                Ok((row.get::<_, EntityId>(0)?, row.get::<_, String>(1)?))
            })
            .context("query entity names")?;
        let mut out = HashMap::new();
        for row in rows {
            let (id, name) = row.context("decode entity name")?;
            out.insert(id, name);
        }
        Ok(out)
    }

    pub fn seasons_with_data(&self, kind: EntityKind) -> Result<Vec<Season>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT season FROM stat_values WHERE kind = ?1")
            .context("prepare seasons query")?;
        let rows = stmt
            .query_map(params![kind.code()], |row| row.get::<_, String>(0))
            .context("query seasons")?;
        let mut out = Vec::new();
        for row in rows {
            let label = row.context("decode season")?;
            out.push(label.parse::<Season>()?);
        }
        out.sort_unstable_by(|a, b| b.cmp(a));
        Ok(out)
    }

    pub fn update_entity_field(
        &mut self,
        kind: EntityKind,
        entity_id: EntityId,
        field: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let Some(column) = EDITABLE_FIELDS.iter().find(|f| **f == field) else {
            return Err(anyhow!("field `{field}` is not editable"));
        };
        let sql = format!(
            "UPDATE entities SET {column} = ?1, updated_at = ?2 WHERE kind = ?3 AND entity_id = ?4"
        );
        let changed = self
            .conn
            .execute(
                &sql,
                params![value, Utc::now().to_rfc3339(), kind.code(), entity_id],
            )
            .with_context(|| format!("update {kind} {entity_id} {field}"))?;
        if changed == 0 {
            return Err(anyhow!("no {kind} with id {entity_id}"));
        }
        Ok(())
    }

    pub fn entity_field(
        &self,
        kind: EntityKind,
        entity_id: EntityId,
        field: &str,
    ) -> Result<Option<String>> {
        let Some(column) = EDITABLE_FIELDS.iter().find(|f| **f == field) else {
            return Err(anyhow!("field `{field}` is not editable"));
        };
        let sql = format!("SELECT {column} FROM entities WHERE kind = ?1 AND entity_id = ?2");
        let value = self
            .conn
            .query_row(&sql, params![kind.code(), entity_id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()
            .with_context(|| format!("read {kind} {entity_id} {field}"))?;
        Ok(value.flatten())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS entities (
            kind INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            abbreviation TEXT NULL,
            height_inches TEXT NULL,
            weight_lbs TEXT NULL,
            wingspan_inches TEXT NULL,
            jersey_number TEXT NULL,
            notes TEXT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (kind, entity_id)
        );

        CREATE TABLE IF NOT EXISTS entity_seasons (
            kind INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            season TEXT NOT NULL,
            season_type INTEGER NOT NULL,
            team_id INTEGER NULL,
            PRIMARY KEY (kind, entity_id, season, season_type)
        );
        CREATE INDEX IF NOT EXISTS idx_entity_seasons_team
            ON entity_seasons(season, season_type, team_id);

        CREATE TABLE IF NOT EXISTS stat_values (
            kind INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            season TEXT NOT NULL,
            season_type INTEGER NOT NULL,
            stat TEXT NOT NULL,
            value REAL NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (kind, entity_id, season, season_type, stat)
        );
        CREATE INDEX IF NOT EXISTS idx_stat_values_season
            ON stat_values(kind, season, season_type);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: EntityId, team: EntityId) -> RosterEntry {
        RosterEntry {
            kind: EntityKind::Player,
            entity_id: id,
            name: format!("Player {id}"),
            team_id: Some(team),
            abbreviation: None,
        }
    }

    #[test]
    fn rollup_sums_measured_player_values_per_team() {
        let mut store = Store::open_in_memory().unwrap();
        let season = Season::from_start_year(2024);
        let st = SeasonType::Regular;
        store
            .upsert_roster(season, st, &[player(1, 10), player(2, 10), player(3, 20)])
            .unwrap();
        let mut values = BTreeMap::new();
        values.insert(1, StatValues::from([("ast".to_string(), Some(5.0))]));
        values.insert(2, StatValues::from([("ast".to_string(), Some(7.0))]));
        values.insert(3, StatValues::from([("ast".to_string(), None)]));
        store.write_values(EntityKind::Player, season, st, &values).unwrap();

        let teams = store
            .rollup_team_values(season, st, &["ast".to_string()])
            .unwrap();
        assert_eq!(teams[&10]["ast"], Some(12.0));
        assert_eq!(teams[&20]["ast"], None);
    }

    #[test]
    fn editable_fields_are_whitelisted() {
        let mut store = Store::open_in_memory().unwrap();
        let season = Season::from_start_year(2024);
        store
            .upsert_roster(season, SeasonType::Regular, &[player(1, 10)])
            .unwrap();
        store
            .update_entity_field(EntityKind::Player, 1, "wingspan_inches", Some("84"))
            .unwrap();
        assert_eq!(
            store
                .entity_field(EntityKind::Player, 1, "wingspan_inches")
                .unwrap()
                .as_deref(),
            Some("84")
        );
        assert!(
            store
                .update_entity_field(EntityKind::Player, 1, "name", Some("x"))
                .is_err()
        );
        assert!(
            store
                .update_entity_field(EntityKind::Player, 99, "notes", Some("x"))
                .is_err()
        );
    }
}
