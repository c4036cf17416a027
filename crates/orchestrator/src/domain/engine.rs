use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One managed container capable of hosting AceStream playback sessions.
///
/// `engine_key` is the stable identity: the container id when known, else
/// `host:port`. The key is fixed at construction time and never recomputed —
/// an engine never migrates between the two identity schemes during its
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub engine_key: String,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub streams: Vec<String>,
}

impl Engine {
    pub fn new(engine_key: String, host: String, port: u16, labels: HashMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            engine_key,
            container_id: None,
            container_name: None,
            host,
            port,
            labels,
            first_seen: now,
            last_seen: now,
            streams: Vec::new(),
        }
    }

    /// Merge labels from a later event, event wins on key collision.
    pub fn merge_labels(&mut self, incoming: &HashMap<String, String>) {
        for (k, v) in incoming {
            self.labels.insert(k.clone(), v.clone());
        }
    }

    pub fn touch(&mut self, host: String, port: u16) {
        self.host = host;
        self.port = port;
        self.last_seen = Utc::now();
    }

    pub fn add_stream(&mut self, stream_id: &str) {
        if !self.streams.iter().any(|s| s == stream_id) {
            self.streams.push(stream_id.to_string());
        }
    }
}
