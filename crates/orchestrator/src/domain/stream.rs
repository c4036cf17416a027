use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed tagged variant for the kind of key that identifies a stream's
/// content. Parsed into a discriminated enum rather than left as a free-form
/// string, per the "dynamic configuration" design note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKeyType {
    ContentId,
    Infohash,
    Url,
    Magnet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Started,
    Ended,
}

/// One playback session tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub key_type: StreamKeyType,
    pub key: String,
    pub container_id: String,
    pub playback_session_id: String,
    pub stat_url: String,
    pub command_url: String,
    pub is_live: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: StreamStatus,
}

impl Stream {
    /// `status = ended` iff `ended_at` is set — enforced by construction:
    /// the only way to reach the ended state is through `end()`.
    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
        self.status = StreamStatus::Ended;
    }
}
