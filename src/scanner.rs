//! Drives a symbol list through batched history fetches and EMA computation.
//!
//! Batches run one after another; the members of a batch are fetched
//! concurrently, so at most `batch_size` requests are outstanding against the
//! provider at any time. A failing symbol is skipped and never aborts the scan.

use crate::error::{NseError, ScanError};
use crate::indicators::{EmaScanResult, compute_all_emas};
use crate::ports::{HistoricalDataProvider, SymbolInfo};
use crate::price_history::DateRange;
use crate::scan_cache::ScanCache;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_LOOKBACK_MONTHS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Symbols fetched concurrently per batch.
    pub batch_size: usize,
    pub lookback_months: u32,
    /// Wait between consecutive batches.
    pub batch_pause: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            lookback_months: DEFAULT_LOOKBACK_MONTHS,
            batch_pause: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub completed: usize,
    pub total: usize,
}

impl ScanProgress {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// What happened to one symbol in a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Hit(EmaScanResult),
    Computed(EmaScanResult),
    Skipped(ScanError),
}

/// Summary returned once a scan settles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub total: usize,
    pub emitted: usize,
    pub cache_hits: usize,
    pub skipped: Vec<ScanError>,
    pub elapsed: Duration,
}

impl ScanReport {
    fn record(&mut self, outcome: SymbolOutcome) {
        match outcome {
            SymbolOutcome::Hit(_) => {
                self.cache_hits += 1;
                self.emitted += 1;
            }
            SymbolOutcome::Computed(_) => self.emitted += 1,
            SymbolOutcome::Skipped(reason) => self.skipped.push(reason),
        }
    }
}

struct ScanningGuard<'a>(&'a AtomicBool);

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ScanOrchestrator {
    provider: Arc<dyn HistoricalDataProvider>,
    cache: Arc<RwLock<ScanCache>>,
    settings: ScanSettings,
    scanning: AtomicBool,
    progress: watch::Sender<ScanProgress>,
    results: watch::Sender<Vec<EmaScanResult>>,
}

impl ScanOrchestrator {
    pub fn new(
        provider: Arc<dyn HistoricalDataProvider>,
        cache: Arc<RwLock<ScanCache>>,
        settings: ScanSettings,
    ) -> Self {
        let (progress, _) = watch::channel(ScanProgress::default());
        let (results, _) = watch::channel(Vec::new());
        Self {
            provider,
            cache,
            settings,
            scanning: AtomicBool::new(false),
            progress,
            results,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn cache(&self) -> Arc<RwLock<ScanCache>> {
        Arc::clone(&self.cache)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> ScanProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    /// Snapshot of the results accumulated by the current or last scan.
    pub fn results(&self) -> Vec<EmaScanResult> {
        self.results.borrow().clone()
    }

    pub fn subscribe_results(&self) -> watch::Receiver<Vec<EmaScanResult>> {
        self.results.subscribe()
    }

    /// Scans `symbols` with a one-year window ending today.
    ///
    /// Returns `None` without touching any state when the list is empty or a
    /// scan is already running.
    pub async fn start_scan(&self, symbols: &[SymbolInfo]) -> Option<ScanReport> {
        self.start_scan_as_of(symbols, Local::now().date_naive()).await
    }

    pub async fn start_scan_as_of(
        &self,
        symbols: &[SymbolInfo],
        today: NaiveDate,
    ) -> Option<ScanReport> {
        if symbols.is_empty() {
            debug!("empty symbol list, nothing to scan");
            return None;
        }
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(requested = symbols.len(), "scan already in progress, request ignored");
            return None;
        }
        let _guard = ScanningGuard(&self.scanning);

        let started = Instant::now();
        let total = symbols.len();
        let batch_size = self.settings.batch_size.max(1);
        let range = DateRange::trailing_months(today, self.settings.lookback_months);

        self.progress.send_replace(ScanProgress { completed: 0, total });
        self.results.send_replace(Vec::new());
        info!(total, batch_size, from = %range.start, to = %range.end, "starting EMA scan");

        // one fetch and one cache write per symbol per scan
        let mut seen = HashSet::new();
        let first_seen: Vec<bool> = symbols
            .iter()
            .map(|s| seen.insert(s.symbol.as_str()))
            .collect();

        let mut report = ScanReport {
            total,
            ..ScanReport::default()
        };

        for (i, (batch, firsts)) in symbols
            .chunks(batch_size)
            .zip(first_seen.chunks(batch_size))
            .enumerate()
        {
            if i > 0 && !self.settings.batch_pause.is_zero() {
                tokio::time::sleep(self.settings.batch_pause).await;
            }

            let tasks: Vec<_> = batch
                .iter()
                .zip(firsts)
                .map(|(info, &first)| self.process_symbol(info, range, first))
                .collect();
            for outcome in futures::future::join_all(tasks).await {
                report.record(outcome);
            }
        }

        report.elapsed = started.elapsed();
        info!(
            total,
            emitted = report.emitted,
            cache_hits = report.cache_hits,
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "EMA scan finished"
        );
        Some(report)
    }

    async fn process_symbol(
        &self,
        info: &SymbolInfo,
        range: DateRange,
        first_seen: bool,
    ) -> SymbolOutcome {
        let outcome = if first_seen {
            self.scan_symbol(info, range).await
        } else {
            SymbolOutcome::Skipped(ScanError::Duplicate {
                symbol: info.symbol.clone(),
            })
        };

        match &outcome {
            SymbolOutcome::Hit(result) | SymbolOutcome::Computed(result) => {
                self.emit(result.clone())
            }
            SymbolOutcome::Skipped(reason) => warn!(symbol = %info.symbol, %reason, "symbol skipped"),
        }
        self.progress.send_modify(|p| p.completed += 1);
        outcome
    }

    async fn scan_symbol(&self, info: &SymbolInfo, range: DateRange) -> SymbolOutcome {
        let cached = self.cache.read().await.get(&info.symbol).cloned();
        if let Some(hit) = cached {
            debug!(symbol = %info.symbol, "cache hit");
            return SymbolOutcome::Hit(hit);
        }

        let history = match self.provider.daily_history(&info.symbol, range).await {
            Ok(history) => history,
            Err(e) => return SymbolOutcome::Skipped(classify_fetch_error(&info.symbol, &e)),
        };

        let snapshot = compute_all_emas(&history);
        let result = EmaScanResult::from_snapshot(&info.symbol, &info.company_name, &snapshot);
        self.cache.write().await.put(&info.symbol, result.clone());
        debug!(symbol = %info.symbol, points = history.len(), "EMAs computed");
        SymbolOutcome::Computed(result)
    }

    fn emit(&self, result: EmaScanResult) {
        self.results.send_if_modified(|results| {
            if results.iter().any(|r| r.symbol == result.symbol) {
                false
            } else {
                results.push(result);
                true
            }
        });
    }
}

fn classify_fetch_error(symbol: &str, error: &anyhow::Error) -> ScanError {
    match error.downcast_ref::<NseError>() {
        Some(NseError::Payload { reason, .. }) => ScanError::MalformedPayload {
            symbol: symbol.to_string(),
            reason: reason.clone(),
        },
        _ => ScanError::Fetch {
            symbol: symbol.to_string(),
            reason: format!("{error:#}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_ratio() {
        assert_eq!(ScanProgress::default().ratio(), 0.0);
        let p = ScanProgress { completed: 5, total: 20 };
        assert_eq!(p.ratio(), 0.25);
        assert!(!p.is_complete());
        assert!(ScanProgress { completed: 20, total: 20 }.is_complete());
    }

    #[test]
    fn payload_errors_are_classified_as_malformed() {
        let err = anyhow::Error::new(NseError::Payload {
            path: "/api/historical/cm/equity".into(),
            reason: "payload is null".into(),
        });
        assert_eq!(
            classify_fetch_error("TCS", &err),
            ScanError::MalformedPayload {
                symbol: "TCS".into(),
                reason: "payload is null".into()
            }
        );

        let err = anyhow::anyhow!("connection reset");
        assert!(matches!(
            classify_fetch_error("TCS", &err),
            ScanError::Fetch { reason, .. } if reason == "connection reset"
        ));
    }
}
