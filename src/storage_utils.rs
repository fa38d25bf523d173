use crate::candle::Interval;
use crate::ranking::SortDirection;
use crate::streak::Direction;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS
// `storage/config.json` deserializes straight into these.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KlineConfig {
    pub limit: u32,         // candles per symbol, e.g. 99
    pub interval: Interval, // e.g. "1m", "15m", "1d"
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            limit: 99,
            interval: Interval::OneDay,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UniverseConfig {
    pub quote_asset: String, // e.g. "USDT"
    #[serde(default)]
    pub excluded: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            excluded: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DelayConfig {
    Constant { secs: u64 },
    WindowAware { window_secs: u64 },
    Adaptive { window_secs: u64 },
    TokenBucket { capacity: f64, refill_per_sec: f64 },
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig::Constant { secs: 60 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Fixed chunk size; derived from the weight budget when absent.
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default = "default_weight_limit")]
    pub weight_limit_per_minute: u32,
    #[serde(default)]
    pub delay: DelayConfig,
}

fn default_weight_limit() -> u32 {
    2400
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: Some(400),
            weight_limit_per_minute: default_weight_limit(),
            delay: DelayConfig::default(),
        }
    }
}

/// Which screen to run, with its own knobs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScreenConfig {
    /// Price change over the newest `count` candles.
    WindowChange {
        count: usize,
        #[serde(default)]
        direction: SortDirection,
    },
    /// Sum of trades over the newest `count` candles.
    TradeCount { count: usize },
    /// Longest trailing run of same-direction candles.
    Streak { direction: Direction },
    /// Rebound from the most recent swing low.
    SwingLowRebound { width: usize },
    /// Recoveries and declines whose extreme is at most `max_offset` candles old.
    FreshExtremes { max_offset: usize },
    /// Latest close at least `min_multiple` times the lowest low of `count` candles.
    MultipleFromLow { count: usize, min_multiple: f64 },
    /// Top gainers per day over `days` daily candles.
    DailyTopGainers {
        days: u32,
        top_n: usize,
        #[serde(default)]
        benchmark: Option<String>,
    },
    /// Change against opens captured at `anchor_time` (epoch millis).
    PreparedWindowChange { anchor_time: i64 },
    /// One symbol resampled into `group_size` coarse candles, both alignments.
    BoundaryViews { symbol: String, group_size: usize },
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig::WindowChange {
            count: 3,
            direction: SortDirection::Descending,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    // Nested structs organize the config logically
    #[serde(default)]
    pub klines: KlineConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path of the storage directory (e.g. ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Storage directory relative to the running executable, created if missing.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Self::at(base_dir).await
    }

    pub async fn at(base_dir: PathBuf) -> anyhow::Result<Self> {
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Writes `data` as pretty JSON through a `.tmp` file and a rename, so a
    /// crash mid-write never leaves a truncated file behind.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));

        // serde_json validates the bytes itself; no need for read_to_string.
        let content = fs::read(path).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Loads `config.json`, writing the defaults first when it does not exist.
    pub async fn load_config(&self) -> anyhow::Result<AppConfig> {
        let path = self.base_dir.join("config.json");
        if !path.exists() {
            let config = AppConfig::default();
            self.save("config", &config).await?;
            info!(path = %path.display(), "wrote default configuration");
            return Ok(config);
        }
        self.load("config").await
    }
}
