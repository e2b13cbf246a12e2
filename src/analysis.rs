//! This module wires the scan pipeline together:
//! 1. Resolves the preset's symbols from the directory.
//! 2. Runs the batched EMA scan over them.
//! 3. Persists the results so the next session starts with data on screen.

use crate::indicators::EmaScanResult;
use crate::nse_client::NseClient;
use crate::ports::{HistoricalDataProvider, SymbolDirectory};
use crate::presets::{ScanPreset, load_preset};
use crate::scan_cache::ScanCache;
use crate::scanner::{ScanOrchestrator, ScanReport};
use crate::storage_utils::{AppConfig, AsyncStorageManager};
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const RESULTS_FILE: &str = "results";

/// What `results.json` holds.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ScanSnapshot {
    pub last_updated_timestamp: i64,
    pub preset: ScanPreset,
    pub results: Vec<EmaScanResult>,
}

pub struct Screener {
    pub config: AppConfig,
    pub storage: AsyncStorageManager,
    directory: Arc<dyn SymbolDirectory>,
    orchestrator: Arc<ScanOrchestrator>,
}

impl Screener {
    pub fn new(
        config: AppConfig,
        storage: AsyncStorageManager,
        directory: Arc<dyn SymbolDirectory>,
        provider: Arc<dyn HistoricalDataProvider>,
    ) -> Self {
        let cache = Arc::new(RwLock::new(ScanCache::new(config.scanner.cache_freshness())));
        let orchestrator = Arc::new(ScanOrchestrator::new(
            provider,
            cache,
            config.scanner.scan_settings(),
        ));
        Self {
            config,
            storage,
            directory,
            orchestrator,
        }
    }

    /// Loads (or initialises) `config.json` from the storage directory next to
    /// the binary and connects to NSE.
    pub async fn from_storage() -> Result<Self> {
        let storage = AsyncStorageManager::new_relative("storage").await?;
        let config: AppConfig = storage.load_or_init("config").await?;
        let client = Arc::new(NseClient::new(config.nse.clone())?);
        Ok(Self::new(config, storage, client.clone(), client))
    }

    pub fn orchestrator(&self) -> Arc<ScanOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Resolves `preset`, scans it and saves the outcome.
    ///
    /// Returns `Ok(None)` when the orchestrator declined the scan (busy, or
    /// the preset resolved to no symbols).
    pub async fn run_scan(&self, preset: ScanPreset) -> Result<Option<(ScanSnapshot, ScanReport)>> {
        let symbols =
            load_preset(preset, self.directory.as_ref(), &self.config.nse.movers_index).await?;
        info!(%preset, symbols = symbols.len(), "preset resolved");

        let Some(report) = self.orchestrator.start_scan(&symbols).await else {
            warn!(%preset, "scan not started");
            return Ok(None);
        };

        let snapshot = ScanSnapshot {
            last_updated_timestamp: Utc::now().timestamp_millis(),
            preset,
            results: self.orchestrator.results(),
        };
        self.storage.save(RESULTS_FILE, &snapshot).await?;

        Ok(Some((snapshot, report)))
    }

    pub async fn load_snapshot(&self) -> Result<ScanSnapshot> {
        self.storage.load(RESULTS_FILE).await
    }
}
