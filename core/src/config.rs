use serde::Deserialize;
use std::fs;

use crate::error::{CoreError, Result};

/// Recognized configuration, loaded from `config.toml`: a fixed record
/// of recognized options, unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub integrator: IntegratorConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeConfig {
    #[serde(default = "default_cap_per_source")]
    pub cap_per_source: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_cap_per_source() -> usize {
    3000
}
fn default_concurrency() -> usize {
    4
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            cap_per_source: default_cap_per_source(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegratorConfig {
    #[serde(default = "default_chunk")]
    pub chunk: usize,
    #[serde(default = "default_batch")]
    pub batch: usize,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_chunk() -> usize {
    50
}
fn default_batch() -> usize {
    1000
}
fn default_tick_secs() -> u64 {
    10
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            chunk: default_chunk(),
            batch: default_batch(),
            tick_secs: default_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacesConfig {
    #[serde(default)]
    pub enrich_enabled: bool,
    #[serde(default = "default_refresh_days")]
    pub refresh_days: i64,
    #[serde(default = "default_rate_delay_ms")]
    pub rate_delay_ms: u64,
    #[serde(default = "default_refresh_cron")]
    pub refresh_cron: String,
}

fn default_refresh_days() -> i64 {
    30
}
fn default_rate_delay_ms() -> u64 {
    200
}
fn default_refresh_cron() -> String {
    "03:00 daily".to_string()
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            enrich_enabled: false,
            refresh_days: default_refresh_days(),
            rate_delay_ms: default_rate_delay_ms(),
            refresh_cron: default_refresh_cron(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_subbatch")]
    pub subbatch: usize,
    #[serde(default = "default_sleep_ms")]
    pub sleep_ms: u64,
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dimensions() -> usize {
    1536
}
fn default_subbatch() -> usize {
    20
}
fn default_sleep_ms() -> u64 {
    1000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            dimensions: default_dimensions(),
            subbatch: default_subbatch(),
            sleep_ms: default_sleep_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfig {
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,
    #[serde(default = "default_cb_failure_rate")]
    pub cb_failure_rate: f64,
    #[serde(default = "default_cb_window")]
    pub cb_window: usize,
    #[serde(default = "default_cb_min_calls")]
    pub cb_min_calls: usize,
    #[serde(default = "default_cb_open_wait_secs")]
    pub cb_open_wait_secs: u64,
    #[serde(default = "default_cb_half_open_probes")]
    pub cb_half_open_probes: usize,
}

fn default_retry_max() -> u32 {
    3
}
fn default_retry_wait_ms() -> u64 {
    300
}
fn default_cb_failure_rate() -> f64 {
    0.5
}
fn default_cb_window() -> usize {
    100
}
fn default_cb_min_calls() -> usize {
    10
}
fn default_cb_open_wait_secs() -> u64 {
    30
}
fn default_cb_half_open_probes() -> usize {
    10
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_max: default_retry_max(),
            retry_wait_ms: default_retry_wait_ms(),
            cb_failure_rate: default_cb_failure_rate(),
            cb_window: default_cb_window(),
            cb_min_calls: default_cb_min_calls(),
            cb_open_wait_secs: default_cb_open_wait_secs(),
            cb_half_open_probes: default_cb_half_open_probes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scrape: ScrapeConfig::default(),
            integrator: IntegratorConfig::default(),
            places: PlacesConfig::default(),
            embedding: EmbeddingConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidInput(format!("failed to read config file '{path}': {e}")))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Convenience for binaries that ship no `config.toml` at all and rely
    /// purely on defaults + environment overrides for secrets.
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.scrape.cap_per_source, 3000);
        assert_eq!(cfg.integrator.chunk, 50);
        assert_eq!(cfg.integrator.batch, 1000);
        assert_eq!(cfg.integrator.tick_secs, 10);
        assert_eq!(cfg.places.refresh_days, 30);
        assert_eq!(cfg.places.rate_delay_ms, 200);
        assert_eq!(cfg.embedding.dimensions, 1536);
        assert_eq!(cfg.embedding.subbatch, 20);
        assert_eq!(cfg.resilience.retry_max, 3);
        assert_eq!(cfg.resilience.cb_window, 100);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let toml_str = "[scrape]\ncap_per_source = 10\nbogus = 1\n";
        let result: std::result::Result<Config, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml_str = "[embedding]\nmodel = \"custom-model\"\n";
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.embedding.model, "custom-model");
        assert_eq!(cfg.embedding.dimensions, 1536);
        assert_eq!(cfg.integrator.chunk, 50);
    }
}
