use crate::presets::{DEFAULT_MOVERS_INDEX, DEFAULT_MOVERS_LIMIT, ScanPreset};
use crate::scan_cache::DEFAULT_FRESHNESS_MINUTES;
use crate::scanner::{DEFAULT_BATCH_SIZE, DEFAULT_LOOKBACK_MONTHS, ScanSettings};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS
// Every field has a default so a partial config.json still loads.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    pub batch_size: usize,         // symbols fetched concurrently
    pub cache_fresh_minutes: i64,  // reuse a result younger than this
    pub lookback_months: u32,      // history window per symbol
    pub batch_pause_ms: u64,       // wait between batches
    pub page_size: usize,          // rows per results page
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cache_fresh_minutes: DEFAULT_FRESHNESS_MINUTES,
            lookback_months: DEFAULT_LOOKBACK_MONTHS,
            batch_pause_ms: 0,
            page_size: crate::filter_utils::DEFAULT_PAGE_SIZE,
        }
    }
}

impl ScannerConfig {
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            batch_size: self.batch_size.max(1),
            lookback_months: self.lookback_months,
            batch_pause: Duration::from_millis(self.batch_pause_ms),
        }
    }

    pub fn cache_freshness(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.cache_fresh_minutes.max(0))
            .unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NseConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub history_chunk_days: u32, // NSE serves long histories in date chunks
    pub movers_index: String,    // e.g. "NIFTY 50"
    pub movers_limit: usize,
}

impl Default for NseConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.nseindia.com".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            timeout_secs: 15,
            history_chunk_days: 66,
            movers_index: DEFAULT_MOVERS_INDEX.to_string(),
            movers_limit: DEFAULT_MOVERS_LIMIT,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    // Nested structs organize the config logically
    pub scanner: ScannerConfig,
    pub nse: NseConfig,
    pub default_preset: ScanPreset,
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g. ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Creates a manager rooted at `relative_path` next to the running
    /// executable, creating the directory if needed.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;

        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Self::new(base_dir).await
    }

    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path_of(filename).exists()
    }

    /// Serializes `data` to `<filename>.json`.
    /// Writes to a .tmp file first and renames it, so a crash mid-write never
    /// leaves a truncated file behind.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_of(filename);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", filename));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        // serde_json validates the bytes itself, no need for read_to_string
        let content = fs::read(self.path_of(filename)).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Loads `<filename>.json`, writing `T::default()` there first if the file
    /// does not exist yet.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        if self.exists(filename) {
            return self.load(filename).await;
        }
        let data = T::default();
        self.save(filename, &data).await?;
        info!(path = %self.path_of(filename).display(), "wrote default {}", filename);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("nse-screener-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = scratch_dir("storage");
        let storage = AsyncStorageManager::new(&dir).await.unwrap();

        let mut config = AppConfig::default();
        config.scanner.batch_size = 4;
        config.default_preset = ScanPreset::Losers;
        storage.save("config", &config).await.unwrap();

        let loaded: AppConfig = storage.load("config").await.unwrap();
        assert_eq!(loaded, config);
        assert!(!dir.join("config.json.tmp").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_config_is_initialised_with_defaults() {
        let dir = scratch_dir("init");
        let _ = std::fs::remove_dir_all(&dir);
        let storage = AsyncStorageManager::new(&dir).await.unwrap();

        let config: AppConfig = storage.load_or_init("config").await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(storage.exists("config"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "scanner": { "batch_size": 5 }, "default_preset": "gainers" }"#)
                .unwrap();
        assert_eq!(config.scanner.batch_size, 5);
        assert_eq!(config.scanner.cache_fresh_minutes, 15);
        assert_eq!(config.scanner.page_size, 15);
        assert_eq!(config.nse.history_chunk_days, 66);
        assert_eq!(config.default_preset, ScanPreset::Gainers);

        let settings = config.scanner.scan_settings();
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.lookback_months, 12);
        assert_eq!(config.scanner.cache_freshness(), chrono::Duration::minutes(15));
    }

    #[test]
    fn oversized_freshness_saturates() {
        let huge = ScannerConfig {
            cache_fresh_minutes: i64::MAX,
            ..ScannerConfig::default()
        };
        assert_eq!(huge.cache_freshness(), chrono::Duration::MAX);

        let negative = ScannerConfig {
            cache_fresh_minutes: -5,
            ..ScannerConfig::default()
        };
        assert_eq!(negative.cache_freshness(), chrono::Duration::zero());
    }
}
