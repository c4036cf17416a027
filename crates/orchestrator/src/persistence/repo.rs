//! Row types and CRUD helpers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::domain::{Engine, Stream, StreamKeyType, StreamStatus};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Parse a stored timestamp, accepting both RFC3339 (written by this crate)
/// and bare naive strings (a legacy format with no offset) — promoting the
/// latter to UTC unconditionally, since a naive timestamp crossing this
/// boundary is a defect.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| PersistenceError::CorruptRow(format!("unparseable timestamp: {s}")))
}

fn fmt_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

#[derive(Clone)]
pub struct Repo {
    pool: SqlitePool,
}

impl Repo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_engine(&self, engine: &Engine) -> Result<(), PersistenceError> {
        let labels = serde_json::to_string(&engine.labels)
            .map_err(|e| PersistenceError::CorruptRow(e.to_string()))?;
        sqlx::query(
            "INSERT INTO engines (engine_key, container_id, container_name, host, port, labels, first_seen, last_seen)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(engine_key) DO UPDATE SET
                container_id = excluded.container_id,
                container_name = excluded.container_name,
                host = excluded.host,
                port = excluded.port,
                labels = excluded.labels,
                last_seen = excluded.last_seen",
        )
        .bind(&engine.engine_key)
        .bind(&engine.container_id)
        .bind(&engine.container_name)
        .bind(&engine.host)
        .bind(engine.port as i64)
        .bind(labels)
        .bind(fmt_timestamp(&engine.first_seen))
        .bind(fmt_timestamp(&engine.last_seen))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert by id, replacing every column on conflict — a restart of the
    /// same stream id overwrites the whole row, not just its terminal state.
    pub async fn upsert_stream(&self, stream: &Stream) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO streams (id, engine_key, key_type, key, playback_session_id, stat_url, command_url, is_live, started_at, ended_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                engine_key = excluded.engine_key,
                key_type = excluded.key_type,
                key = excluded.key,
                playback_session_id = excluded.playback_session_id,
                stat_url = excluded.stat_url,
                command_url = excluded.command_url,
                is_live = excluded.is_live,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                status = excluded.status",
        )
        .bind(&stream.id)
        .bind(&stream.container_id)
        .bind(key_type_str(stream.key_type))
        .bind(&stream.key)
        .bind(&stream.playback_session_id)
        .bind(&stream.stat_url)
        .bind(&stream.command_url)
        .bind(stream.is_live)
        .bind(fmt_timestamp(&stream.started_at))
        .bind(stream.ended_at.as_ref().map(fmt_timestamp))
        .bind(status_str(stream.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_stream_ended(
        &self,
        stream_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE streams SET ended_at = ?, status = 'ended' WHERE id = ?")
            .bind(fmt_timestamp(&ended_at))
            .bind(stream_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_stat(
        &self,
        stream_id: &str,
        sample: &crate::domain::StatSample,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO stream_stats (stream_id, ts, peers, speed_down, speed_up, downloaded, uploaded, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stream_id)
        .bind(fmt_timestamp(&sample.ts))
        .bind(sample.peers)
        .bind(sample.speed_down)
        .bind(sample.speed_up)
        .bind(sample.downloaded)
        .bind(sample.uploaded)
        .bind(&sample.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load all engines, for boot-time state reconstruction.
    pub async fn load_engines(&self) -> Result<Vec<Engine>, PersistenceError> {
        let rows = sqlx::query_as::<_, RawEngine>(
            "SELECT engine_key, container_id, container_name, host, port, labels, first_seen, last_seen FROM engines",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RawEngine::into_domain).collect()
    }

    /// Container names already recorded in `engines` matching `{prefix}-%`,
    /// for sequential name generation.
    pub async fn container_names_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>, PersistenceError> {
        let pattern = format!("{prefix}-%");
        let rows: Vec<(Option<String>,)> = sqlx::query_as(
            "SELECT container_name FROM engines WHERE container_name LIKE ?",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(|(n,)| n).collect())
    }

    /// Load only streams with `status = 'started'` — ended streams don't
    /// need to be re-hydrated into the live state store.
    pub async fn load_started_streams(&self) -> Result<Vec<Stream>, PersistenceError> {
        let rows = sqlx::query_as::<_, RawStream>(
            "SELECT id, engine_key, key_type, key, playback_session_id, stat_url, command_url, is_live, started_at, ended_at, status
             FROM streams WHERE status = 'started'",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RawStream::into_domain).collect()
    }
}

fn key_type_str(t: StreamKeyType) -> &'static str {
    match t {
        StreamKeyType::ContentId => "content_id",
        StreamKeyType::Infohash => "infohash",
        StreamKeyType::Url => "url",
        StreamKeyType::Magnet => "magnet",
    }
}

fn parse_key_type(s: &str) -> Result<StreamKeyType, PersistenceError> {
    match s {
        "content_id" => Ok(StreamKeyType::ContentId),
        "infohash" => Ok(StreamKeyType::Infohash),
        "url" => Ok(StreamKeyType::Url),
        "magnet" => Ok(StreamKeyType::Magnet),
        other => Err(PersistenceError::CorruptRow(format!(
            "unknown key_type: {other}"
        ))),
    }
}

fn status_str(s: StreamStatus) -> &'static str {
    match s {
        StreamStatus::Started => "started",
        StreamStatus::Ended => "ended",
    }
}

fn parse_status(s: &str) -> Result<StreamStatus, PersistenceError> {
    match s {
        "started" => Ok(StreamStatus::Started),
        "ended" => Ok(StreamStatus::Ended),
        other => Err(PersistenceError::CorruptRow(format!(
            "unknown status: {other}"
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct RawEngine {
    engine_key: String,
    container_id: Option<String>,
    container_name: Option<String>,
    host: String,
    port: i64,
    labels: String,
    first_seen: String,
    last_seen: String,
}

impl RawEngine {
    fn into_domain(self) -> Result<Engine, PersistenceError> {
        let labels = serde_json::from_str(&self.labels).unwrap_or_default();
        Ok(Engine {
            engine_key: self.engine_key,
            container_id: self.container_id,
            container_name: self.container_name,
            host: self.host,
            port: self.port as u16,
            labels,
            first_seen: parse_timestamp(&self.first_seen)?,
            last_seen: parse_timestamp(&self.last_seen)?,
            streams: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct RawStream {
    id: String,
    engine_key: String,
    key_type: String,
    key: String,
    playback_session_id: String,
    stat_url: String,
    command_url: String,
    is_live: bool,
    started_at: String,
    ended_at: Option<String>,
    status: String,
}

impl RawStream {
    fn into_domain(self) -> Result<Stream, PersistenceError> {
        Ok(Stream {
            id: self.id,
            key_type: parse_key_type(&self.key_type)?,
            key: self.key,
            container_id: self.engine_key,
            playback_session_id: self.playback_session_id,
            stat_url: self.stat_url,
            command_url: self.command_url,
            is_live: self.is_live,
            started_at: parse_timestamp(&self.started_at)?,
            ended_at: self.ended_at.map(|s| parse_timestamp(&s)).transpose()?,
            status: parse_status(&self.status)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamp() {
        let ts = parse_timestamp("2024-01-02T03:04:05+00:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn promotes_naive_timestamp_to_utc() {
        let ts = parse_timestamp("2024-01-02 03:04:05").unwrap();
        assert_eq!(ts.timezone(), Utc);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_timestamp("not-a-time").is_err());
    }
}
