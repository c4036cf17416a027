//! The in-memory source of truth for engines, streams and stream stats,
//! with a SQLite write-through.
//!
//! One lock covers all three maps; every mutation commits to memory first
//! and then writes through to the database. The lock is
//! `parking_lot::Mutex` rather than `tokio::sync::Mutex` — every critical
//! section here is synchronous HashMap bookkeeping; the `sqlx` write always
//! happens after the guard is dropped, so no lock is ever held across
//! network or disk I/O.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{Engine, Stream, StreamStatus};
use crate::events::{StreamEndedEvent, StreamStartedEvent};
use crate::persistence::Repo;

struct Inner {
    engines: HashMap<String, Engine>,
    streams: HashMap<String, Stream>,
    stream_stats: HashMap<String, Vec<crate::domain::StatSample>>,
}

pub struct StateStore {
    inner: Mutex<Inner>,
    repo: Repo,
    stats_history_max: usize,
}

impl StateStore {
    pub fn new(repo: Repo, stats_history_max: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                engines: HashMap::new(),
                streams: HashMap::new(),
                stream_stats: HashMap::new(),
            }),
            repo,
            stats_history_max,
        }
    }

    /// Hydrate from the database at boot: all engines, and only streams whose
    /// status is still `started`.
    pub async fn load_from_db(&self) -> Result<(), crate::error::OrchestratorError> {
        let engines = self.repo.load_engines().await?;
        let streams = self.repo.load_started_streams().await?;

        let mut inner = self.inner.lock();
        for engine in engines {
            inner.engines.insert(engine.engine_key.clone(), engine);
        }
        for stream in streams {
            if let Some(engine) = inner.engines.get_mut(&stream.container_id) {
                engine.add_stream(&stream.id);
            }
            inner.streams.insert(stream.id.clone(), stream);
        }
        Ok(())
    }

    pub async fn on_stream_started(&self, evt: &StreamStartedEvent) -> Stream {
        let (engine_key, stream_id, engine_snapshot, stream) = {
            let mut inner = self.inner.lock();

            let engine_key = evt
                .container_id
                .clone()
                .unwrap_or_else(|| format!("{}:{}", evt.engine.host, evt.engine.port));

            match inner.engines.get_mut(&engine_key) {
                Some(engine) => {
                    engine.touch(evt.engine.host.clone(), evt.engine.port);
                    engine.merge_labels(&evt.labels);
                }
                None => {
                    let mut engine = Engine::new(
                        engine_key.clone(),
                        evt.engine.host.clone(),
                        evt.engine.port,
                        evt.labels.clone(),
                    );
                    engine.container_id = evt.container_id.clone();
                    inner.engines.insert(engine_key.clone(), engine);
                }
            }

            let stream_id = evt
                .labels
                .get("stream_id")
                .cloned()
                .unwrap_or_else(|| format!("{}|{}", evt.stream.key, evt.session.playback_session_id));

            let now = Utc::now();
            let stream = Stream {
                id: stream_id.clone(),
                key_type: evt.stream.key_type,
                key: evt.stream.key.clone(),
                container_id: engine_key.clone(),
                playback_session_id: evt.session.playback_session_id.clone(),
                stat_url: evt.session.stat_url.clone(),
                command_url: evt.session.command_url.clone(),
                is_live: evt.session.is_live,
                started_at: now,
                ended_at: None,
                status: StreamStatus::Started,
            };
            inner.streams.insert(stream_id.clone(), stream.clone());
            inner
                .engines
                .get_mut(&engine_key)
                .expect("just inserted or already present")
                .add_stream(&stream_id);

            let engine_snapshot = inner.engines.get(&engine_key).cloned();
            (engine_key, stream_id, engine_snapshot, stream)
        };

        let _ = engine_key;
        let _ = stream_id;
        if let Some(engine) = engine_snapshot {
            if let Err(e) = self.repo.upsert_engine(&engine).await {
                tracing::warn!(error = %e, "failed to persist engine");
            }
        }
        if let Err(e) = self.repo.upsert_stream(&stream).await {
            tracing::warn!(error = %e, "failed to persist stream");
        }
        stream
    }

    /// Resolve and close a stream. If `stream_id` is absent or unknown, fall
    /// back to the most recently started, not-yet-ended stream matching
    /// `container_id` (or any such stream if `container_id` is absent too).
    pub async fn on_stream_ended(&self, evt: &StreamEndedEvent) -> Option<Stream> {
        let stream = {
            let mut inner = self.inner.lock();

            let resolved_id = match &evt.stream_id {
                Some(id) if inner.streams.contains_key(id) => Some(id.clone()),
                _ => inner
                    .streams
                    .values()
                    .filter(|s| {
                        s.ended_at.is_none()
                            && evt
                                .container_id
                                .as_ref()
                                .map(|cid| *cid == s.container_id)
                                .unwrap_or(true)
                    })
                    .max_by_key(|s| s.started_at)
                    .map(|s| s.id.clone()),
            };

            let resolved_id = resolved_id?;
            let stream = inner.streams.get_mut(&resolved_id)?;
            stream.end();
            stream.clone()
        };

        if let Err(e) = self
            .repo
            .mark_stream_ended(&stream.id, stream.ended_at.unwrap_or_else(Utc::now))
            .await
        {
            tracing::warn!(error = %e, "failed to persist stream end");
        }
        Some(stream)
    }

    pub async fn append_stat(&self, stream_id: &str, sample: crate::domain::StatSample) {
        {
            let mut inner = self.inner.lock();
            let entries = inner.stream_stats.entry(stream_id.to_string()).or_default();
            entries.push(sample.clone());
            if entries.len() > self.stats_history_max {
                let excess = entries.len() - self.stats_history_max;
                entries.drain(0..excess);
            }
        }
        if let Err(e) = self.repo.insert_stat(stream_id, &sample).await {
            tracing::warn!(error = %e, "failed to persist stream stat");
        }
    }

    pub fn list_engines(&self) -> Vec<Engine> {
        self.inner.lock().engines.values().cloned().collect()
    }

    pub fn get_engine(&self, engine_key: &str) -> Option<Engine> {
        self.inner.lock().engines.get(engine_key).cloned()
    }

    pub fn list_streams(
        &self,
        status: Option<StreamStatus>,
        container_id: Option<&str>,
    ) -> Vec<Stream> {
        self.inner
            .lock()
            .streams
            .values()
            .filter(|s| status.map(|st| st == s.status).unwrap_or(true))
            .filter(|s| container_id.map(|cid| cid == s.container_id).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn get_stream(&self, stream_id: &str) -> Option<Stream> {
        self.inner.lock().streams.get(stream_id).cloned()
    }

    pub fn get_stream_stats(
        &self,
        stream_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Vec<crate::domain::StatSample> {
        self.inner
            .lock()
            .stream_stats
            .get(stream_id)
            .map(|v| {
                v.iter()
                    .filter(|s| since.map(|since| s.ts >= since).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert or refresh an engine discovered by the reindexer, without
    /// overwriting one already tracked from a stream event.
    pub fn ensure_engine(&self, engine_key: &str, host: String, port: u16, labels: HashMap<String, String>) {
        let mut inner = self.inner.lock();
        inner
            .engines
            .entry(engine_key.to_string())
            .or_insert_with(|| Engine::new(engine_key.to_string(), host, port, labels));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::domain::{StatSample, StreamKeyType};
    use crate::events::{EngineAddress, SessionInfo, StreamEndedEvent, StreamKeyReq, StreamStartedEvent};
    use crate::persistence::Repo;

    use super::*;

    async fn store() -> StateStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite always connects");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations apply cleanly to a fresh in-memory database");
        StateStore::new(Repo::new(pool), 3)
    }

    fn started_event(container_id: &str, key: &str, session: &str) -> StreamStartedEvent {
        StreamStartedEvent {
            container_id: Some(container_id.to_string()),
            engine: EngineAddress {
                host: "127.0.0.1".to_string(),
                port: 40000,
            },
            stream: StreamKeyReq {
                key_type: StreamKeyType::ContentId,
                key: key.to_string(),
            },
            session: SessionInfo {
                playback_session_id: session.to_string(),
                stat_url: "http://127.0.0.1:40000/stat".to_string(),
                command_url: "http://127.0.0.1:40000/cmd".to_string(),
                is_live: true,
            },
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn on_stream_started_derives_id_from_key_and_session() {
        let store = store().await;
        let stream = store.on_stream_started(&started_event("c1", "abc", "ps1")).await;
        assert_eq!(stream.id, "abc|ps1");
        assert_eq!(stream.status, StreamStatus::Started);
        assert!(store.get_engine("c1").is_some());
    }

    #[tokio::test]
    async fn on_stream_started_twice_leaves_one_record_with_latest_started_at() {
        let store = store().await;
        let first = store.on_stream_started(&started_event("c1", "abc", "ps1")).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.on_stream_started(&started_event("c1", "abc", "ps1")).await;

        assert_eq!(store.list_streams(None, None).len(), 1);
        assert!(second.started_at >= first.started_at);
    }

    #[tokio::test]
    async fn on_stream_ended_sets_status_and_timestamp() {
        let store = store().await;
        let started = store.on_stream_started(&started_event("c1", "abc", "ps1")).await;

        let ended = store
            .on_stream_ended(&StreamEndedEvent {
                container_id: None,
                stream_id: Some(started.id.clone()),
                reason: None,
            })
            .await
            .expect("matching stream resolves");

        assert_eq!(ended.status, StreamStatus::Ended);
        assert!(ended.ended_at.is_some());
    }

    #[tokio::test]
    async fn on_stream_ended_falls_back_to_reversed_scan_by_container() {
        let store = store().await;
        store.on_stream_started(&started_event("c1", "abc", "ps1")).await;

        let ended = store
            .on_stream_ended(&StreamEndedEvent {
                container_id: Some("c1".to_string()),
                stream_id: None,
                reason: None,
            })
            .await;

        assert!(ended.is_some());
    }

    #[tokio::test]
    async fn on_stream_ended_with_no_match_is_a_noop() {
        let store = store().await;
        let result = store
            .on_stream_ended(&StreamEndedEvent {
                container_id: Some("nonexistent".to_string()),
                stream_id: None,
                reason: None,
            })
            .await;
        assert!(result.is_none());
        assert!(store.list_streams(None, None).is_empty());
    }

    #[tokio::test]
    async fn append_stat_evicts_oldest_once_history_max_is_exceeded() {
        let store = store().await;
        store.on_stream_started(&started_event("c1", "abc", "ps1")).await;

        for i in 0..5i64 {
            store
                .append_stat(
                    "abc|ps1",
                    StatSample {
                        ts: chrono::Utc::now(),
                        peers: Some(i),
                        speed_down: None,
                        speed_up: None,
                        downloaded: None,
                        uploaded: None,
                        status: None,
                    },
                )
                .await;
        }

        let stats = store.get_stream_stats("abc|ps1", None);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.first().unwrap().peers, Some(2));
        assert_eq!(stats.last().unwrap().peers, Some(4));
    }

    #[tokio::test]
    async fn load_from_db_hydrates_started_streams_only() {
        let store = store().await;
        store.on_stream_started(&started_event("c1", "abc", "ps1")).await;
        let ended_evt = started_event("c1", "def", "ps2");
        store.on_stream_started(&ended_evt).await;
        store
            .on_stream_ended(&StreamEndedEvent {
                container_id: None,
                stream_id: Some("def|ps2".to_string()),
                reason: None,
            })
            .await;

        let fresh = StateStore::new(store.repo.clone(), 3);
        fresh.load_from_db().await.expect("load_from_db succeeds");

        assert_eq!(fresh.list_streams(None, None).len(), 1);
        assert_eq!(fresh.list_streams(None, None)[0].id, "abc|ps1");
    }
}
