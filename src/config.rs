use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub slot_clock: SlotClockConfig,
    #[serde(default)]
    pub engine: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub primary_url: String,
    pub fallback_urls: Vec<String>,
    pub timeout_seconds: u64,
    pub commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotClockConfig {
    /// How far behind the current slot the historical sample is taken.
    pub sample_offset_slots: u64,
    pub sample_window_slots: u64,
    pub min_slot_time_ms: u64,
    pub max_slot_time_ms: u64,
    /// Slot movement since the last estimate that triggers a fresh one.
    pub recompute_slot_delta: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub wallet: Option<String>,
    pub slot_poll_interval_ms: u64,
    pub resync_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
    pub include_file_line: bool,
    pub include_thread_id: bool,
    pub log_to_file: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.solend.fi".to_string(),
            timeout_seconds: 15,
            connect_timeout_seconds: 5,
            user_agent: concat!("points-engine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://api.mainnet-beta.solana.com".to_string(),
            fallback_urls: Vec::new(),
            timeout_seconds: 30,
            commitment: "confirmed".to_string(),
        }
    }
}

impl Default for SlotClockConfig {
    fn default() -> Self {
        Self {
            sample_offset_slots: 5_000_000,
            sample_window_slots: 5,
            min_slot_time_ms: 100,
            max_slot_time_ms: 10_000,
            recompute_slot_delta: 9_000, // roughly an hour of slots
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            wallet: None,
            slot_poll_interval_ms: 2_000,
            resync_interval_seconds: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_file_line: false,
            include_thread_id: false,
            log_to_file: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| anyhow!("Failed to parse config: {}", e))
    }

    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("POINTS_API_URL") {
            self.api.base_url = url;
        }

        if let Ok(url) = std::env::var("SOLANA_RPC_URL") {
            self.rpc.primary_url = url;
        }

        if let Ok(wallet) = std::env::var("POINTS_WALLET") {
            let wallet = wallet.trim().to_string();
            self.engine.wallet = if wallet.is_empty() { None } else { Some(wallet) };
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(interval) = std::env::var("POINTS_RESYNC_SECONDS") {
            self.engine.resync_interval_seconds = Some(
                interval
                    .parse()
                    .map_err(|e| anyhow!("Invalid POINTS_RESYNC_SECONDS: {}", e))?,
            );
        }

        Ok(self)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(path, content).map_err(|e| anyhow!("Failed to write config file: {}", e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(anyhow!("Points API base URL cannot be empty"));
        }

        if self.api.timeout_seconds == 0 || self.api.connect_timeout_seconds == 0 {
            return Err(anyhow!("API timeouts must be positive"));
        }

        if self.rpc.primary_url.is_empty() {
            return Err(anyhow!("Primary RPC URL cannot be empty"));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(anyhow!("RPC timeout must be between 1-300 seconds"));
        }

        if self.slot_clock.sample_window_slots == 0 {
            return Err(anyhow!("Slot sample window must be at least one slot"));
        }

        if self.slot_clock.min_slot_time_ms == 0
            || self.slot_clock.min_slot_time_ms >= self.slot_clock.max_slot_time_ms
        {
            return Err(anyhow!("Slot time bounds must satisfy 0 < min < max"));
        }

        if self.engine.slot_poll_interval_ms == 0 {
            return Err(anyhow!("Slot poll interval must be positive"));
        }

        if self.engine.resync_interval_seconds == Some(0) {
            return Err(anyhow!("Resync interval must be positive when set"));
        }

        if let Some(wallet) = &self.engine.wallet {
            Pubkey::from_str(wallet).map_err(|e| anyhow!("Invalid wallet {}: {}", wallet, e))?;
        }

        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    pub fn api_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.api.connect_timeout_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_seconds)
    }

    pub fn slot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.engine.slot_poll_interval_ms)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        self.engine.resync_interval_seconds.map(Duration::from_secs)
    }

    pub fn tick_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.slot_clock.min_slot_time_ms),
            Duration::from_millis(self.slot_clock.max_slot_time_ms),
        )
    }

    pub fn rpc_urls(&self) -> Vec<String> {
        let mut urls = vec![self.rpc.primary_url.clone()];
        for url in &self.rpc.fallback_urls {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }
}

pub struct ConfigBuilder {
    config: EngineConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn with_api_url(mut self, url: String) -> Self {
        self.config.api.base_url = url;
        self
    }

    pub fn with_rpc_url(mut self, url: String) -> Self {
        self.config.rpc.primary_url = url;
        self
    }

    pub fn with_fallback_rpc_urls(mut self, urls: Vec<String>) -> Self {
        self.config.rpc.fallback_urls = urls;
        self
    }

    pub fn with_wallet(mut self, wallet: String) -> Self {
        self.config.engine.wallet = Some(wallet);
        self
    }

    pub fn with_resync_interval(mut self, seconds: u64) -> Self {
        self.config.engine.resync_interval_seconds = Some(seconds);
        self
    }

    pub fn with_log_level(mut self, level: String) -> Self {
        self.config.logging.level = level;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl EngineConfig {
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.engine.resync_interval_seconds = Some(60);
        config
    }

    pub fn testing() -> Self {
        let mut config = Self::default();
        config.api.base_url = "http://127.0.0.1:8899".to_string();
        config.rpc.primary_url = "http://127.0.0.1:8899".to_string();
        config.logging.level = "warn".to_string();
        config.slot_clock.recompute_slot_delta = 1;
        config
    }
}
