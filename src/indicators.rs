//! Exponential moving averages and the price/EMA relation used by the scanner.

use crate::price_history::{PriceField, PricePoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

/// The four EMA windows the scanner tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmaPeriod {
    #[serde(rename = "10")]
    Ema10,
    #[serde(rename = "20")]
    Ema20,
    #[default]
    #[serde(rename = "50")]
    Ema50,
    #[serde(rename = "200")]
    Ema200,
}

impl EmaPeriod {
    pub const ALL: [EmaPeriod; 4] = [
        EmaPeriod::Ema10,
        EmaPeriod::Ema20,
        EmaPeriod::Ema50,
        EmaPeriod::Ema200,
    ];

    pub fn days(self) -> usize {
        match self {
            EmaPeriod::Ema10 => 10,
            EmaPeriod::Ema20 => 20,
            EmaPeriod::Ema50 => 50,
            EmaPeriod::Ema200 => 200,
        }
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }

    /// Next longer window, wrapping around.
    pub fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    /// Next shorter window, wrapping around.
    pub fn prev(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for EmaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EMA {}", self.days())
    }
}

impl FromStr for EmaPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches(|c: char| !c.is_ascii_digit());
        match digits {
            "10" => Ok(EmaPeriod::Ema10),
            "20" => Ok(EmaPeriod::Ema20),
            "50" => Ok(EmaPeriod::Ema50),
            "200" => Ok(EmaPeriod::Ema200),
            _ => Err(format!("unsupported EMA period `{s}` (expected 10, 20, 50 or 200)")),
        }
    }
}

/// Where the current price sits relative to an EMA. Equality counts as below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRelation {
    Above,
    Below,
}

/// EMA over raw prices, aligned with the input.
///
/// The first `period - 1` entries are `None`; entry `period - 1` is the simple
/// average of the first `period` prices and every later entry follows
/// `ema[i] = price[i] * k + ema[i - 1] * (1 - k)` with `k = 2 / (period + 1)`.
/// A series shorter than `period` yields all `None`. Empty input or a zero
/// period yields an empty vector.
pub fn ema_values(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if prices.is_empty() || period == 0 {
        return Vec::new();
    }

    let mut out = vec![None; prices.len()];
    if prices.len() < period {
        return out;
    }

    let Ok(mut sma) = SimpleMovingAverage::new(period) else {
        return Vec::new();
    };
    let mut ema = prices[..period].iter().fold(0.0, |_, &p| sma.next(p));
    out[period - 1] = Some(ema);

    let k = 2.0 / (period as f64 + 1.0);
    for (i, &price) in prices.iter().enumerate().skip(period) {
        ema = price * k + ema * (1.0 - k);
        out[i] = Some(ema);
    }
    out
}

/// EMA of `field` over a series the caller has already sorted oldest first.
pub fn compute_ema(series: &[PricePoint], period: usize, field: PriceField) -> Vec<Option<f64>> {
    let prices: Vec<f64> = series.iter().map(|p| p.price(field)).collect();
    ema_values(&prices, period)
}

pub fn price_relation_to_ema(current_price: f64, ema: Option<f64>) -> Option<PriceRelation> {
    let ema = ema.filter(|v| !v.is_nan())?;
    if current_price > ema {
        Some(PriceRelation::Above)
    } else {
        Some(PriceRelation::Below)
    }
}

/// Signed distance from `ema` to `price` in percent.
pub fn percent_to_ema(price: f64, ema: Option<f64>) -> Option<f64> {
    match ema {
        Some(ema) if ema != 0.0 && !ema.is_nan() => Some((price - ema) / ema * 100.0),
        _ => None,
    }
}

/// All four EMA series for one symbol plus the latest close.
///
/// `current_price` is `0.0` when the input was empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmaSnapshot {
    pub ema10: Vec<Option<f64>>,
    pub ema20: Vec<Option<f64>>,
    pub ema50: Vec<Option<f64>>,
    pub ema200: Vec<Option<f64>>,
    pub current_price: f64,
    pub current_ema10: Option<f64>,
    pub current_ema20: Option<f64>,
    pub current_ema50: Option<f64>,
    pub current_ema200: Option<f64>,
}

impl EmaSnapshot {
    pub fn series(&self, period: EmaPeriod) -> &[Option<f64>] {
        match period {
            EmaPeriod::Ema10 => &self.ema10,
            EmaPeriod::Ema20 => &self.ema20,
            EmaPeriod::Ema50 => &self.ema50,
            EmaPeriod::Ema200 => &self.ema200,
        }
    }

    pub fn current(&self, period: EmaPeriod) -> Option<f64> {
        match period {
            EmaPeriod::Ema10 => self.current_ema10,
            EmaPeriod::Ema20 => self.current_ema20,
            EmaPeriod::Ema50 => self.current_ema50,
            EmaPeriod::Ema200 => self.current_ema200,
        }
    }
}

/// Runs the four scanner EMAs over the closes of `series`, which may arrive
/// in any order.
pub fn compute_all_emas(series: &[PricePoint]) -> EmaSnapshot {
    if series.is_empty() {
        return EmaSnapshot::default();
    }

    let mut sorted = series.to_vec();
    sorted.sort_by_key(|p| p.date);

    let ema = |period: EmaPeriod| compute_ema(&sorted, period.days(), PriceField::Close);

    let mut snapshot = EmaSnapshot {
        current_price: sorted.last().map_or(0.0, |p| p.close),
        ema10: ema(EmaPeriod::Ema10),
        ema20: ema(EmaPeriod::Ema20),
        ema50: ema(EmaPeriod::Ema50),
        ema200: ema(EmaPeriod::Ema200),
        ..EmaSnapshot::default()
    };
    let last = |snapshot: &EmaSnapshot, period: EmaPeriod| {
        snapshot.series(period).last().copied().flatten()
    };
    snapshot.current_ema10 = last(&snapshot, EmaPeriod::Ema10);
    snapshot.current_ema20 = last(&snapshot, EmaPeriod::Ema20);
    snapshot.current_ema50 = last(&snapshot, EmaPeriod::Ema50);
    snapshot.current_ema200 = last(&snapshot, EmaPeriod::Ema200);
    snapshot
}

/// One symbol's scan outcome. Immutable once built; a rescan replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaScanResult {
    pub symbol: String,
    pub company_name: String,
    pub current_price: f64,
    pub ema10: Option<f64>,
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub relation_to_ema10: Option<PriceRelation>,
    pub relation_to_ema20: Option<PriceRelation>,
    pub relation_to_ema50: Option<PriceRelation>,
    pub relation_to_ema200: Option<PriceRelation>,
}

impl EmaScanResult {
    pub fn from_snapshot(symbol: &str, company_name: &str, snapshot: &EmaSnapshot) -> Self {
        let price = snapshot.current_price;
        Self {
            symbol: symbol.to_string(),
            company_name: company_name.to_string(),
            current_price: price,
            ema10: snapshot.current_ema10,
            ema20: snapshot.current_ema20,
            ema50: snapshot.current_ema50,
            ema200: snapshot.current_ema200,
            relation_to_ema10: price_relation_to_ema(price, snapshot.current_ema10),
            relation_to_ema20: price_relation_to_ema(price, snapshot.current_ema20),
            relation_to_ema50: price_relation_to_ema(price, snapshot.current_ema50),
            relation_to_ema200: price_relation_to_ema(price, snapshot.current_ema200),
        }
    }

    pub fn ema(&self, period: EmaPeriod) -> Option<f64> {
        match period {
            EmaPeriod::Ema10 => self.ema10,
            EmaPeriod::Ema20 => self.ema20,
            EmaPeriod::Ema50 => self.ema50,
            EmaPeriod::Ema200 => self.ema200,
        }
    }

    pub fn relation(&self, period: EmaPeriod) -> Option<PriceRelation> {
        match period {
            EmaPeriod::Ema10 => self.relation_to_ema10,
            EmaPeriod::Ema20 => self.relation_to_ema20,
            EmaPeriod::Ema50 => self.relation_to_ema50,
            EmaPeriod::Ema200 => self.relation_to_ema200,
        }
    }
}
