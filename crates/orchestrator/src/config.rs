//! Validated configuration record, loaded once at boot.
//!
//! Layering mirrors `ClusterConfig::load`: compile-time defaults, then an
//! optional TOML file, then environment variables (highest priority).
//! Environment variable keys are flat rather than `ClusterConfig`'s nested
//! `CLUSTER__SECTION__KEY` convention — this configuration has no nested
//! sections to disambiguate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub app_port: u16,
    pub docker_network: Option<String>,
    pub target_image: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub container_label: String,
    pub startup_timeout_s: u64,
    pub idle_ttl_s: u64,
    pub collect_interval_s: u64,
    pub stats_history_max: usize,
    pub port_range_host: String,
    pub ace_http_range: String,
    pub ace_https_range: String,
    pub ace_map_https: bool,
    pub api_key: Option<String>,
    pub db_url: String,
    pub auto_delete: bool,
    pub docker_socket: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_port: 8000,
            docker_network: None,
            target_image: "acestream/engine:latest".to_string(),
            min_replicas: 0,
            max_replicas: 20,
            container_label: "ondemand.app=myservice".to_string(),
            startup_timeout_s: 25,
            idle_ttl_s: 600,
            collect_interval_s: 5,
            stats_history_max: 720,
            port_range_host: "19000-19999".to_string(),
            ace_http_range: "40000-44999".to_string(),
            ace_https_range: "45000-49999".to_string(),
            ace_map_https: false,
            api_key: None,
            db_url: "sqlite://./orchestrator.db".to_string(),
            auto_delete: false,
            docker_socket: String::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from an optional TOML file, then environment
    /// variables, layered over compile-time defaults.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&OrchestratorConfig::default())
            .context("failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        let config_path = std::env::var("ORCH_CONFIG_FILE")
            .unwrap_or_else(|_| "/etc/orchestrator/orchestrator.toml".to_string());
        builder = builder.add_source(config::File::with_name(&config_path).required(false));
        builder = builder.add_source(config::File::with_name("orchestrator").required(false));

        builder = builder.add_source(config::Environment::default().try_parsing(true));

        builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    /// Validate port-range strings and numeric bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_replicas == 0 {
            anyhow::bail!("max_replicas must be > 0");
        }
        if self.max_replicas < self.min_replicas {
            anyhow::bail!("max_replicas must be >= min_replicas");
        }
        if !self.container_label.contains('=') {
            anyhow::bail!("container_label must contain '=' (key=value format)");
        }
        for (name, range) in [
            ("port_range_host", &self.port_range_host),
            ("ace_http_range", &self.ace_http_range),
            ("ace_https_range", &self.ace_https_range),
        ] {
            parse_port_range(range)
                .with_context(|| format!("invalid {name}: {range}"))?;
        }
        if self.startup_timeout_s == 0 {
            anyhow::bail!("startup_timeout_s must be > 0");
        }
        if self.idle_ttl_s == 0 {
            anyhow::bail!("idle_ttl_s must be > 0");
        }
        if self.collect_interval_s == 0 {
            anyhow::bail!("collect_interval_s must be > 0");
        }
        if self.stats_history_max == 0 {
            anyhow::bail!("stats_history_max must be > 0");
        }
        Ok(())
    }
}

/// Parse a `"lo-hi"` port range string, both bounds in `1..=65535`, `lo <= hi`.
pub fn parse_port_range(s: &str) -> Result<(u16, u16)> {
    let (lo_s, hi_s) = s
        .split_once('-')
        .with_context(|| format!("expected 'lo-hi' format, got '{s}'"))?;
    let lo: u16 = lo_s.parse().context("lo is not a valid port")?;
    let hi: u16 = hi_s.parse().context("hi is not a valid port")?;
    if lo == 0 || hi == 0 {
        anyhow::bail!("ports must be between 1-65535");
    }
    if lo > hi {
        anyhow::bail!("lo must be <= hi");
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = OrchestratorConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_replicas() {
        let mut cfg = OrchestratorConfig::default();
        cfg.max_replicas = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_max_below_min() {
        let mut cfg = OrchestratorConfig::default();
        cfg.min_replicas = 5;
        cfg.max_replicas = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_label_without_equals() {
        let mut cfg = OrchestratorConfig::default();
        cfg.container_label = "nolabel".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_port_range() {
        assert_eq!(parse_port_range("19000-19999").unwrap(), (19000, 19999));
    }

    #[test]
    fn rejects_reversed_port_range() {
        assert!(parse_port_range("200-100").is_err());
    }

    #[test]
    fn rejects_malformed_port_range() {
        assert!(parse_port_range("not-a-range").is_err());
        assert!(parse_port_range("100").is_err());
    }
}
