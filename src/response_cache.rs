use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::error::FetchError;
use crate::fetch::{StatsSource, UpstreamCall};

pub struct ResponseCache {
    conn: Connection,
    max_age: Duration,
}

impl ResponseCache {
    pub fn open(path: &Path, max_age: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open response cache {}", path.display()))?;
        Self::with_connection(conn, max_age)
    }

    pub fn open_in_memory(max_age: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory response cache")?;
        Self::with_connection(conn, max_age)
    }

    fn with_connection(conn: Connection, max_age: Duration) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS response_cache (
                fingerprint TEXT PRIMARY KEY,
                endpoint TEXT NOT NULL,
                params_json TEXT NOT NULL,
                body TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            );
            "#,
        )
        .context("create response cache schema")?;
        Ok(Self { conn, max_age })
    }

    pub fn get(&self, call: &UpstreamCall) -> Result<Option<String>> {
        let oldest = now_secs().saturating_sub(self.max_age.as_secs()) as i64;
        self.conn
            .query_row(
                "SELECT body FROM response_cache WHERE fingerprint = ?1 AND fetched_at >= ?2",
                params![call.fingerprint(), oldest],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("read cached response")
    }

    pub fn put(&self, call: &UpstreamCall, body: &str) -> Result<()> {
        let params_json = serde_json::to_string(&call.params).context("serialize call params")?;
        self.conn
            .execute(
                r#"
                INSERT INTO response_cache (fingerprint, endpoint, params_json, body, fetched_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(fingerprint) DO UPDATE SET
                    body = excluded.body,
                    fetched_at = excluded.fetched_at
                "#,
                params![
                    call.fingerprint(),
                    call.endpoint,
                    params_json,
                    body,
                    now_secs() as i64
                ],
            )
            .context("store cached response")?;
        Ok(())
    }

    pub fn purge_expired(&self) -> Result<usize> {
        let oldest = now_secs().saturating_sub(self.max_age.as_secs()) as i64;
        self.conn
            .execute(
                "DELETE FROM response_cache WHERE fetched_at < ?1",
                params![oldest],
            )
            .context("purge response cache")
    }
}

pub struct CachedSource<S> {
    inner: S,
    cache: ResponseCache,
}

impl<S: StatsSource> CachedSource<S> {
    pub fn new(inner: S, cache: ResponseCache) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: StatsSource> StatsSource for CachedSource<S> {
    fn lookup_cached(&mut self, call: &UpstreamCall) -> Option<String> {
        match self.cache.get(call) {
            Ok(body) => body,
            Err(err) => {
                warn!(call = %call.describe(), error = %err, "response cache read failed");
                None
            }
        }
    }

    fn call(&mut self, call: &UpstreamCall) -> Result<String, FetchError> {
        let body = self.inner.call(call)?;
        if body.trim_start().starts_with('{')
            && let Err(err) = self.cache.put(call, &body)
        {
            warn!(call = %call.describe(), error = %err, "response cache write failed");
        }
        Ok(body)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
