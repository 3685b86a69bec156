use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tangle_protocol::ProtocolParameters;

const APP_DIR: &str = "tangle";
const DATABASE_NAME: &str = "node.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parses a level name, falling back to `Info` for anything unknown.
    pub fn parse_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    pub fn as_tracing_level(&self) -> Option<tracing::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Trace => Some(tracing::Level::TRACE),
        }
    }
}

/// Serde adapter storing durations as human readable strings ("15s", "1m").
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Request and stream settings of the gossip layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Maximum time a request stays in the request queue.
    #[serde(with = "duration_str")]
    pub requests_discard_older_than: Duration,
    /// Interval at which pending requests are re-enqueued.
    #[serde(with = "duration_str")]
    pub requests_pending_reenqueue_interval: Duration,
    /// Maximum number of unknown peers a gossip connection is established to.
    pub unknown_peers_limit: usize,
    #[serde(with = "duration_str")]
    pub stream_read_timeout: Duration,
    #[serde(with = "duration_str")]
    pub stream_write_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            requests_discard_older_than: Duration::from_secs(15),
            requests_pending_reenqueue_interval: Duration::from_secs(5),
            unknown_peers_limit: 4,
            stream_read_timeout: Duration::from_secs(60),
            stream_write_timeout: Duration::from_secs(10),
        }
    }
}

pub const MAX_FAUCET_OUTPUT_COUNT: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Funds sent when the target address holds less than this amount.
    pub amount: u64,
    /// Funds sent when the target address already holds more than `amount`.
    pub small_amount: u64,
    pub max_address_balance: u64,
    pub max_output_count: usize,
    pub indexation_message: String,
    #[serde(with = "duration_str")]
    pub batch_timeout: Duration,
    /// Zero lets the node pick the worker count.
    pub pow_worker_count: usize,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            amount: 10_000_000,
            small_amount: 1_000_000,
            max_address_balance: 20_000_000,
            max_output_count: MAX_FAUCET_OUTPUT_COUNT,
            indexation_message: "HORNET FAUCET".to_string(),
            batch_timeout: Duration::from_secs(2),
            pow_worker_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Stop the node when the parameters manager reports a critical error.
    pub halt_on_critical_error: bool,
    /// Parameters written to an empty database on first start.
    pub genesis: ProtocolParameters,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            halt_on_critical_error: true,
            genesis: ProtocolParameters::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub log_level: LogLevel,
    pub gossip: GossipConfig,
    pub faucet: FaucetConfig,
    pub protocol: ProtocolConfig,
    pub storage: StorageConfig,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join(APP_DIR)
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join(APP_DIR)
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn ensure_dirs() -> std::io::Result<()> {
    fs::create_dir_all(config_dir())?;
    fs::create_dir_all(data_dir())?;
    Ok(())
}

impl NodeConfig {
    /// Loads the config file, using defaults when it is missing or unreadable.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config {:?}, using defaults: {}",
                    config_path(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn try_load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_toml(&fs::read_to_string(&path)?)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> Result<()> {
        let _ = ensure_dirs();
        let content = toml::to_string_pretty(self)?;
        fs::write(config_path(), content)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| data_dir().join(DATABASE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        let faucet = &self.faucet;
        if faucet.small_amount > faucet.amount {
            return Err(ConfigError::Invalid(format!(
                "faucet.small_amount ({}) must not exceed faucet.amount ({})",
                faucet.small_amount, faucet.amount
            )));
        }
        if faucet.amount > faucet.max_address_balance {
            return Err(ConfigError::Invalid(format!(
                "faucet.amount ({}) must not exceed faucet.max_address_balance ({})",
                faucet.amount, faucet.max_address_balance
            )));
        }
        if faucet.max_output_count == 0 || faucet.max_output_count > MAX_FAUCET_OUTPUT_COUNT {
            return Err(ConfigError::Invalid(format!(
                "faucet.max_output_count must be between 1 and {}",
                MAX_FAUCET_OUTPUT_COUNT
            )));
        }

        let gossip = &self.gossip;
        for (name, value) in [
            ("requests_discard_older_than", gossip.requests_discard_older_than),
            (
                "requests_pending_reenqueue_interval",
                gossip.requests_pending_reenqueue_interval,
            ),
            ("stream_read_timeout", gossip.stream_read_timeout),
            ("stream_write_timeout", gossip.stream_write_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "gossip.{} must be greater than zero",
                    name
                )));
            }
        }

        self.protocol
            .genesis
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("protocol.genesis: {}", e)))?;

        Ok(())
    }
}
