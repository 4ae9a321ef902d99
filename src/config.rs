use anyhow::{Context, Result};
use config as config_loader;
use dotenvy::dotenv;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global config structure
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// RocksDB storage config
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: String,
    #[serde(default = "StorageConfig::default_compression")]
    pub compression: bool,
}

impl StorageConfig {
    fn default_compression() -> bool {
        true
    }
}

/// Ingestion and read-path settings
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    pub chain_id: String,
    #[serde(default = "IndexerConfig::default_start_block")]
    pub start_block: u64,
    #[serde(default = "IndexerConfig::default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "IndexerConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "IndexerConfig::default_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "IndexerConfig::default_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "IndexerConfig::default_gap_check_lookback")]
    pub gap_check_lookback: usize,
    #[serde(default = "IndexerConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "IndexerConfig::default_balance_cache_ttl_secs")]
    pub balance_cache_ttl_secs: u64,
    #[serde(default = "IndexerConfig::default_max_retries")]
    pub max_retries: u32,
}

impl IndexerConfig {
    fn default_start_block() -> u64 {
        1
    }
    fn default_concurrency() -> usize {
        8
    }
    fn default_batch_size() -> usize {
        10_000
    }
    fn default_timeout_secs() -> u64 {
        30
    }
    fn default_gap_check_lookback() -> usize {
        1_000
    }
    fn default_poll_interval_secs() -> u64 {
        3
    }
    fn default_balance_cache_ttl_secs() -> u64 {
        48 * 60 * 60
    }
    fn default_max_retries() -> u32 {
        5
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn balance_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.balance_cache_ttl_secs)
    }
}

/// Logging config
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default = "LoggingConfig::default_to_file")]
    pub to_file: bool,
    #[serde(default = "LoggingConfig::default_file_path")]
    pub file_path: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_to_file() -> bool {
        true
    }
    fn default_file_path() -> String {
        "./logs/indexer.log".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            to_file: Self::default_to_file(),
            file_path: Self::default_file_path(),
        }
    }
}

/// Metrics config
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "MetricsConfig::default_enable")]
    pub enable: bool,
    #[serde(default = "MetricsConfig::default_prometheus_exporter_port")]
    pub prometheus_exporter_port: u16,
}

impl MetricsConfig {
    fn default_enable() -> bool {
        false
    }
    fn default_prometheus_exporter_port() -> u16 {
        9100
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: Self::default_enable(),
            prometheus_exporter_port: Self::default_prometheus_exporter_port(),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenv().ok(); // Load the .env file

        if !path.as_ref().exists() {
            anyhow::bail!("Config file not found: {:?}", path.as_ref());
        }

        // File first, then INDEXER__SECTION__KEY overrides
        let builder = config_loader::Config::builder()
            .add_source(config_loader::File::from(path.as_ref().to_path_buf()))
            .add_source(config_loader::Environment::with_prefix("INDEXER").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config {:?}", path.as_ref()))?;

        let cfg = builder
            .try_deserialize::<AppConfig>()
            .context("Invalid indexer configuration")?;
        if cfg.indexer.chain_id.is_empty() || cfg.indexer.chain_id.contains(':') {
            anyhow::bail!("chain_id must be non-empty and free of ':'");
        }
        Ok(cfg)
    }
}
