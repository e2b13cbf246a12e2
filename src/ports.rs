use crate::price_history::{DateRange, PricePoint};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A scannable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub company_name: String,
}

impl SymbolInfo {
    pub fn new(symbol: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            company_name: company_name.into(),
        }
    }
}

/// A constituent row of an index listing, as used for the movers presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMover {
    pub symbol: String,
    pub company_name: Option<String>,
    pub p_change: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GainersLosers {
    pub gainers: Vec<IndexMover>,
    pub losers: Vec<IndexMover>,
}

// Need async_trait for async functions in object-safe traits
#[async_trait]
pub trait HistoricalDataProvider: Send + Sync {
    /// Daily history for `symbol` within `range`, in any order.
    /// An empty vector means the provider has no data; it is not an error.
    async fn daily_history(&self, symbol: &str, range: DateRange) -> Result<Vec<PricePoint>>;
}

#[async_trait]
pub trait SymbolDirectory: Send + Sync {
    /// Every listed symbol, in directory order.
    async fn symbols(&self) -> Result<Vec<SymbolInfo>>;

    async fn gainers_losers(&self, index: &str) -> Result<GainersLosers>;
}
