#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use nse_screener::error::NseError;
use nse_screener::ports::{GainersLosers, HistoricalDataProvider, IndexMover, SymbolDirectory, SymbolInfo};
use nse_screener::price_history::{DateRange, PricePoint};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `len` daily closes rising by one from 100, ending on `end`.
pub fn rising_history(end: NaiveDate, len: usize) -> Vec<PricePoint> {
    (0..len)
        .map(|i| {
            let date = end.checked_sub_days(Days::new((len - 1 - i) as u64)).unwrap();
            PricePoint::from_close(date, 100.0 + i as f64)
        })
        .collect()
}

pub fn symbols(names: &[&str]) -> Vec<SymbolInfo> {
    names
        .iter()
        .map(|s| SymbolInfo::new(*s, format!("{s} Ltd")))
        .collect()
}

#[derive(Default)]
pub struct MockProvider {
    pub calls: Mutex<Vec<(String, DateRange)>>,
    pub failing: HashSet<String>,
    pub malformed: HashSet<String>,
    pub empty: HashSet<String>,
    pub delay: Duration,
    pub gate: Option<Semaphore>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HistoricalDataProvider for MockProvider {
    async fn daily_history(&self, symbol: &str, range: DateRange) -> Result<Vec<PricePoint>> {
        self.calls.lock().unwrap().push((symbol.to_string(), range));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await?;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(symbol) {
            anyhow::bail!("connection reset by peer");
        }
        if self.malformed.contains(symbol) {
            return Err(NseError::Payload {
                path: "/api/historical/cm/equity".to_string(),
                reason: "historical payload is a string".to_string(),
            }
            .into());
        }
        if self.empty.contains(symbol) {
            return Ok(Vec::new());
        }
        // newest first, as NSE serves it
        let mut history = rising_history(range.end, 60);
        history.reverse();
        Ok(history)
    }
}

pub struct MockDirectory {
    pub listing: Vec<SymbolInfo>,
    pub movers: GainersLosers,
}

impl MockDirectory {
    pub fn new(listing: Vec<SymbolInfo>) -> Self {
        Self {
            listing,
            movers: GainersLosers::default(),
        }
    }
}

pub fn mover(symbol: &str, p_change: f64) -> IndexMover {
    IndexMover {
        symbol: symbol.to_string(),
        company_name: None,
        p_change,
    }
}

#[async_trait]
impl SymbolDirectory for MockDirectory {
    async fn symbols(&self) -> Result<Vec<SymbolInfo>> {
        Ok(self.listing.clone())
    }

    async fn gainers_losers(&self, _index: &str) -> Result<GainersLosers> {
        Ok(self.movers.clone())
    }
}
