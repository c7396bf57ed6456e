//! Runtime settings.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file
//! (`config/stockledger.toml`), then `STOCKLEDGER__SECTION__KEY` environment
//! variables, e.g. `STOCKLEDGER__LEDGER__NEGATIVE_STOCK=reject`.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use stockledger_core::PartNumber;
use stockledger_inventory::{
    DEFAULT_LOW_STOCK_THRESHOLD, NegativeStockPolicy, Part, PartStatus, PostingSettings,
};

use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/stockledger.toml";
const ENV_PREFIX: &str = "STOCKLEDGER";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// When absent the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub low_stock_threshold: i64,
    pub negative_stock: NegativeStockPolicy,
    pub store_timeout_ms: u64,
    pub conflict_retries: u32,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            negative_stock: NegativeStockPolicy::Warn,
            store_timeout_ms: 5_000,
            conflict_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval_ms: 1_000,
            max_attempts: 5,
            retry_base_ms: 500,
        }
    }
}

impl OutboxSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Redelivery schedule for failed publishes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_millis(self.retry_base_ms),
            Duration::from_secs(60),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuickAdjustmentSettings {
    pub parts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub part_number: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: PartStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub parts: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
    /// `json` or `pretty`.
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub ledger: LedgerSection,
    pub outbox: OutboxSettings,
    pub quick_adjustment: QuickAdjustmentSettings,
    pub catalog: CatalogSettings,
    pub log: LogSettings,
}

impl LedgerSettings {
    /// Load from [`DEFAULT_CONFIG_PATH`] (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Parse TOML text; environment variables still override it.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    pub fn posting(&self) -> PostingSettings {
        PostingSettings {
            low_stock_threshold: self.ledger.low_stock_threshold,
            negative_stock: self.ledger.negative_stock,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.store_timeout_ms)
    }

    pub fn conflict_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.ledger.conflict_retries,
            Duration::from_millis(20),
            Duration::from_millis(500),
        )
    }

    pub fn quick_adjustment_parts(&self) -> Result<Vec<PartNumber>, ConfigError> {
        self.quick_adjustment
            .parts
            .iter()
            .map(|raw| {
                PartNumber::parse(raw).map_err(|e| {
                    ConfigError::Message(format!("quick_adjustment.parts: {e}"))
                })
            })
            .collect()
    }

    pub fn catalog_parts(&self) -> Result<Vec<Part>, ConfigError> {
        self.catalog
            .parts
            .iter()
            .map(|entry| {
                let part_number = PartNumber::parse(&entry.part_number)
                    .map_err(|e| ConfigError::Message(format!("catalog.parts: {e}")))?;
                Ok(Part::new(part_number, entry.category.clone()).with_status(entry.status))
            })
            .collect()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("quick_adjustment.parts")
}
