use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::record::EntityKind;
use crate::season::{Season, SeasonType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    Roster,
    Player,
    Team,
}

impl EntityScope {
    pub fn key(self) -> &'static str {
        match self {
            EntityScope::Roster => "roster",
            EntityScope::Player => "player",
            EntityScope::Team => "team",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "roster" => Some(EntityScope::Roster),
            "player" => Some(EntityScope::Player),
            "team" => Some(EntityScope::Team),
            _ => None,
        }
    }

    pub fn entity_kind(self) -> Option<EntityKind> {
        match self {
            EntityScope::Roster => None,
            EntityScope::Player => Some(EntityKind::Player),
            EntityScope::Team => Some(EntityKind::Team),
        }
    }
}

impl From<EntityKind> for EntityScope {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Player => EntityScope::Player,
            EntityKind::Team => EntityScope::Team,
        }
    }
}

impl fmt::Display for EntityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub endpoint: String,
    pub season: Season,
    pub season_type: SeasonType,
    pub scope: EntityScope,
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.endpoint, self.season, self.season_type, self.scope
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    InProgress,
    Complete,
}

impl CheckpointStatus {
    pub fn key(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Complete => "complete",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(CheckpointStatus::Pending),
            "in_progress" => Some(CheckpointStatus::InProgress),
            "complete" => Some(CheckpointStatus::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRow {
    pub key: CheckpointKey,
    pub status: CheckpointStatus,
    pub calls_done: usize,
    pub calls_total: usize,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: String,
}

pub struct CheckpointStore {
    conn: Connection,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open checkpoint db {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory checkpoint db")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS checkpoints (
                endpoint TEXT NOT NULL,
                season TEXT NOT NULL,
                season_type INTEGER NOT NULL,
                scope TEXT NOT NULL,
                status TEXT NOT NULL,
                calls_done INTEGER NOT NULL DEFAULT 0,
                calls_total INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (endpoint, season, season_type, scope)
            );
            "#,
        )
        .context("create checkpoint schema")?;
        Ok(Self { conn })
    }

    pub fn status(&self, key: &CheckpointKey) -> Result<CheckpointStatus> {
        Ok(self
            .get(key)?
            .map_or(CheckpointStatus::Pending, |row| row.status))
    }

    pub fn get(&self, key: &CheckpointKey) -> Result<Option<CheckpointRow>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT status, calls_done, calls_total, attempts, last_error, updated_at
                FROM checkpoints
                WHERE endpoint = ?1 AND season = ?2 AND season_type = ?3 AND scope = ?4
                "#,
                params![
                    key.endpoint,
                    key.season.label(),
                    key.season_type.code(),
                    key.scope.key()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("read checkpoint {key}"))?;
        let Some((status, done, total, attempts, last_error, updated_at)) = row else {
            return Ok(None);
        };
        let status = CheckpointStatus::parse(&status)
            .ok_or_else(|| anyhow!("checkpoint {key} has unknown status `{status}`"))?;
        Ok(Some(CheckpointRow {
            key: key.clone(),
            status,
            calls_done: done.max(0) as usize,
            calls_total: total.max(0) as usize,
            attempts: attempts.max(0) as u32,
            last_error,
            updated_at,
        }))
    }

    pub fn mark_in_progress(&mut self, key: &CheckpointKey) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO checkpoints (endpoint, season, season_type, scope, status, attempts, updated_at)
                VALUES (?1, ?2, ?3, ?4, 'in_progress', 1, ?5)
                ON CONFLICT(endpoint, season, season_type, scope) DO UPDATE SET
                    status = 'in_progress',
                    attempts = checkpoints.attempts + 1,
                    updated_at = excluded.updated_at
                "#,
                params![
                    key.endpoint,
                    key.season.label(),
                    key.season_type.code(),
                    key.scope.key(),
                    Utc::now().to_rfc3339()
                ],
            )
            .with_context(|| format!("mark checkpoint {key} in progress"))?;
        Ok(())
    }

    /// Records partial progress; the unit stays in progress so the next run
    /// redoes it.
    pub fn mark_transient_failure(
        &mut self,
        key: &CheckpointKey,
        calls_done: usize,
        calls_total: usize,
        error: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO checkpoints (endpoint, season, season_type, scope, status,
                                         calls_done, calls_total, attempts, last_error, updated_at)
                VALUES (?1, ?2, ?3, ?4, 'in_progress', ?5, ?6, 1, ?7, ?8)
                ON CONFLICT(endpoint, season, season_type, scope) DO UPDATE SET
                    status = 'in_progress',
                    calls_done = excluded.calls_done,
                    calls_total = excluded.calls_total,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at
                "#,
                params![
                    key.endpoint,
                    key.season.label(),
                    key.season_type.code(),
                    key.scope.key(),
                    calls_done as i64,
                    calls_total as i64,
                    error,
                    Utc::now().to_rfc3339()
                ],
            )
            .with_context(|| format!("record failure for checkpoint {key}"))?;
        Ok(())
    }

    pub fn mark_complete(&mut self, key: &CheckpointKey, calls_total: usize) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO checkpoints (endpoint, season, season_type, scope, status,
                                         calls_done, calls_total, attempts, updated_at)
                VALUES (?1, ?2, ?3, ?4, 'complete', ?5, ?5, 1, ?6)
                ON CONFLICT(endpoint, season, season_type, scope) DO UPDATE SET
                    status = 'complete',
                    calls_done = excluded.calls_done,
                    calls_total = excluded.calls_total,
                    last_error = NULL,
                    updated_at = excluded.updated_at
                "#,
                params![
                    key.endpoint,
                    key.season.label(),
                    key.season_type.code(),
                    key.scope.key(),
                    calls_total as i64,
                    Utc::now().to_rfc3339()
                ],
            )
            .with_context(|| format!("mark checkpoint {key} complete"))?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<CheckpointRow>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT endpoint, season, season_type, scope, status,
                       calls_done, calls_total, attempts, last_error, updated_at
                FROM checkpoints
                ORDER BY season ASC, season_type ASC, updated_at ASC
                "#,
            )
            .context("prepare checkpoint list")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })
            .context("query checkpoint list")?;

        let mut out = Vec::new();
        for row in rows {
            let (endpoint, season, st, scope, status, done, total, attempts, last_error, updated_at) =
                row.context("decode checkpoint row")?;
            let (Some(season_type), Some(scope), Some(status)) = (
                SeasonType::from_code(st),
                EntityScope::parse(&scope),
                CheckpointStatus::parse(&status),
            ) else {
                continue;
            };
            out.push(CheckpointRow {
                key: CheckpointKey {
                    endpoint,
                    season: season.parse()?,
                    season_type,
                    scope,
                },
                status,
                calls_done: done.max(0) as usize,
                calls_total: total.max(0) as usize,
                attempts: attempts.max(0) as u32,
                last_error,
                updated_at,
            });
        }
        Ok(out)
    }

    pub fn reset(&mut self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM checkpoints", [])
            .context("reset checkpoints")
    }
}
