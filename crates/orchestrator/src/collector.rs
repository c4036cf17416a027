//! Periodically scrapes each live stream's stat URL.
//!
//! Fans out with bounded concurrency via `futures::stream::FuturesUnordered`
//! — one future per currently-started stream — instead of a fixed worker
//! pool. Shutdown is a `tokio::sync::watch` signal, the same mechanism
//! `cluster/src/state.rs` uses for its own background task.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::debug;

use crate::domain::{StatSample, StreamStatus};
use crate::metrics::Metrics;
use crate::store::StateStore;

pub fn spawn(
    store: Arc<StateStore>,
    metrics: Arc<Metrics>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .expect("reqwest client with static config always builds");

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let streams = store.list_streams(Some(StreamStatus::Started), None);
            let mut futs = FuturesUnordered::new();
            for stream in streams {
                let client = client.clone();
                let store = store.clone();
                let metrics = metrics.clone();
                futs.push(async move {
                    collect_one(&client, &store, &metrics, &stream.id, &stream.stat_url).await;
                });
            }
            while futs.next().await.is_some() {}

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

async fn collect_one(
    client: &reqwest::Client,
    store: &StateStore,
    metrics: &Metrics,
    stream_id: &str,
    stat_url: &str,
) {
    let response = match client.get(stat_url).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!(stream_id, error = %e, "stat scrape request failed");
            metrics.collect_errors.inc();
            return;
        }
    };

    if response.status().as_u16() >= 300 {
        return;
    }

    let body: serde_json::Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            debug!(stream_id, error = %e, "stat scrape response was not valid JSON");
            metrics.collect_errors.inc();
            return;
        }
    };

    let payload = body.get("response").cloned().unwrap_or(serde_json::Value::Null);
    let sample = StatSample {
        ts: chrono::Utc::now(),
        peers: payload.get("peers").and_then(|v| v.as_i64()),
        speed_down: payload.get("speed_down").and_then(|v| v.as_i64()),
        speed_up: payload.get("speed_up").and_then(|v| v.as_i64()),
        downloaded: payload.get("downloaded").and_then(|v| v.as_i64()),
        uploaded: payload.get("uploaded").and_then(|v| v.as_i64()),
        status: payload
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    };

    store.append_stat(stream_id, sample).await;
}
