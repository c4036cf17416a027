//! Stream lifecycle event DTOs and the auto-delete task.
//!
//! The auto-delete task makes up to three attempts to stop the originating
//! container, falling back to a label-matched managed container
//! (`stream_id` label, then the `host.http_port` label derived from the
//! stream's stat URL), with a `1 * (attempt + 1)` second backoff between
//! attempts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{Stream, StreamKeyType};
use crate::provisioner::{Provisioner, HOST_LABEL_HTTP};

#[derive(Debug, Clone, Deserialize)]
pub struct EngineAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamKeyReq {
    pub key_type: StreamKeyType,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub playback_session_id: String,
    pub stat_url: String,
    pub command_url: String,
    pub is_live: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamStartedEvent {
    pub container_id: Option<String>,
    pub engine: EngineAddress,
    pub stream: StreamKeyReq,
    pub session: SessionInfo,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamEndedEvent {
    pub container_id: Option<String>,
    pub stream_id: Option<String>,
    pub reason: Option<String>,
}

/// Spawn the three-attempt auto-delete task for a just-ended stream. A no-op
/// unless `AUTO_DELETE` is set — the caller checks that before spawning.
pub fn spawn_auto_delete(provisioner: Arc<Provisioner>, stream: Stream) {
    tokio::spawn(async move {
        let host_port_label = host_port_from_stat_url(&stream.stat_url).map(|p| p.to_string());

        for attempt in 0..3u32 {
            if provisioner.stop_container(&stream.container_id).await.is_ok() {
                return;
            }

            if let Ok(candidates) = provisioner.list_managed().await {
                for c in candidates {
                    if c.labels.get("stream_id") == Some(&stream.id) {
                        let _ = provisioner.stop_container(&c.id).await;
                        return;
                    }
                    if let Some(hp) = &host_port_label {
                        if c.labels.get(HOST_LABEL_HTTP) == Some(hp) {
                            let _ = provisioner.stop_container(&c.id).await;
                            return;
                        }
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(attempt as u64 + 1)).await;
        }
    });
}

fn host_port_from_stat_url(stat_url: &str) -> Option<u16> {
    reqwest::Url::parse(stat_url).ok()?.port()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_port_from_stat_url() {
        assert_eq!(
            host_port_from_stat_url("http://127.0.0.1:40123/stat?id=abc"),
            Some(40123)
        );
    }

    #[test]
    fn missing_port_in_stat_url_yields_none() {
        assert_eq!(host_port_from_stat_url("http://127.0.0.1/stat"), None);
    }

    #[test]
    fn deserializes_stream_started_event() {
        let json = r#"{
            "container_id": "abc123",
            "engine": {"host": "127.0.0.1", "port": 40000},
            "stream": {"key_type": "content_id", "key": "deadbeef"},
            "session": {
                "playback_session_id": "sess1",
                "stat_url": "http://127.0.0.1:40000/stat",
                "command_url": "http://127.0.0.1:40000/cmd",
                "is_live": true
            },
            "labels": {"foo": "bar"}
        }"#;
        let evt: StreamStartedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(evt.stream.key_type, StreamKeyType::ContentId);
        assert_eq!(evt.labels.get("foo"), Some(&"bar".to_string()));
    }
}
