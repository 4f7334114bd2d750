//! Exporter configuration

use anyhow::Result;
use serde::Deserialize;

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Port the ingestion/metrics server listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Seconds between scoring cycles
    #[serde(default = "default_scoring_interval")]
    pub scoring_interval_secs: u64,
}

fn default_listen_port() -> u16 {
    9090
}

fn default_scoring_interval() -> u64 {
    2
}

impl ExporterConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXPORTER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| ExporterConfig {
            listen_port: default_listen_port(),
            scoring_interval_secs: default_scoring_interval(),
        }))
    }
}
