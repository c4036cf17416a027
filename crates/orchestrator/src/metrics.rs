//! Prometheus metrics: a small Counter/Gauge set backed by the `prometheus`
//! crate's `Registry` plus `TextEncoder`, exposed at `/metrics`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub events_started: IntCounter,
    pub events_ended: IntCounter,
    pub collect_errors: IntCounter,
    pub streams_active: IntGauge,
    pub provision_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_started =
            IntCounter::new("orch_events_started_total", "stream_started events").unwrap();
        let events_ended =
            IntCounter::new("orch_events_ended_total", "stream_ended events").unwrap();
        let collect_errors =
            IntCounter::new("orch_collector_errors_total", "collector errors").unwrap();
        let streams_active = IntGauge::new("orch_streams_active", "active streams").unwrap();
        let provision_total = IntCounterVec::new(
            Opts::new("orch_provision_total", "provision requests"),
            &["kind"],
        )
        .unwrap();

        registry
            .register(Box::new(events_started.clone()))
            .unwrap();
        registry.register(Box::new(events_ended.clone())).unwrap();
        registry
            .register(Box::new(collect_errors.clone()))
            .unwrap();
        registry
            .register(Box::new(streams_active.clone()))
            .unwrap();
        registry
            .register(Box::new(provision_total.clone()))
            .unwrap();

        Self {
            registry,
            events_started,
            events_ended,
            collect_errors,
            streams_active,
            provision_total,
        }
    }

    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buf)
            .expect("prometheus text encoding cannot fail for a well-formed registry");
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_metrics() {
        let metrics = Metrics::new();
        metrics.events_started.inc();
        metrics.provision_total.with_label_values(&["acestream"]).inc();
        let text = metrics.encode();
        assert!(text.contains("orch_events_started_total"));
        assert!(text.contains("orch_provision_total"));
    }
}
