use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scraped sample of a stream's engine-reported stats. Every numeric
/// field is optional because the engine's `/stat` JSON is free-form and not
/// every field is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSample {
    pub ts: DateTime<Utc>,
    pub peers: Option<i64>,
    pub speed_down: Option<i64>,
    pub speed_up: Option<i64>,
    pub downloaded: Option<i64>,
    pub uploaded: Option<i64>,
    pub status: Option<String>,
}
