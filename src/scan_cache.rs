//! Per-symbol memo of scan results with a freshness window.

use crate::indicators::EmaScanResult;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

pub const DEFAULT_FRESHNESS_MINUTES: i64 = 15;

/// A cached result with the time it was stored.
#[derive(Debug, Clone)]
pub struct ScanCacheEntry {
    pub result: EmaScanResult,
    pub stored_at: DateTime<Utc>,
}

impl ScanCacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: Duration) -> bool {
        now - self.stored_at < freshness
    }
}

/// Expiry is passive: a stale entry is reported as a miss but stays in the
/// map until the symbol is stored again. There is no size bound.
#[derive(Debug)]
pub struct ScanCache {
    entries: HashMap<String, ScanCacheEntry>,
    freshness: Duration,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_FRESHNESS_MINUTES))
    }
}

impl ScanCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            freshness,
        }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    pub fn get(&self, symbol: &str) -> Option<&EmaScanResult> {
        self.get_at(symbol, Utc::now())
    }

    pub fn get_at(&self, symbol: &str, now: DateTime<Utc>) -> Option<&EmaScanResult> {
        self.entries
            .get(symbol)
            .filter(|entry| entry.is_fresh(now, self.freshness))
            .map(|entry| &entry.result)
    }

    pub fn put(&mut self, symbol: &str, result: EmaScanResult) {
        self.put_at(symbol, result, Utc::now());
    }

    pub fn put_at(&mut self, symbol: &str, result: EmaScanResult, now: DateTime<Utc>) {
        self.entries.insert(
            symbol.to_string(),
            ScanCacheEntry {
                result,
                stored_at: now,
            },
        );
    }

    /// Entries held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{EmaSnapshot, EmaScanResult};

    fn result(symbol: &str, price: f64) -> EmaScanResult {
        let snap = EmaSnapshot {
            current_price: price,
            ..EmaSnapshot::default()
        };
        EmaScanResult::from_snapshot(symbol, "", &snap)
    }

    #[test]
    fn fresh_then_stale() {
        let mut cache = ScanCache::default();
        let t0 = Utc::now();
        cache.put_at("X", result("X", 10.0), t0);

        assert_eq!(cache.get_at("X", t0).map(|r| r.current_price), Some(10.0));
        assert!(cache.get_at("X", t0 + Duration::minutes(14)).is_some());
        assert!(cache.get_at("X", t0 + Duration::minutes(15)).is_none());
        assert!(cache.get_at("X", t0 + Duration::minutes(16)).is_none());
        // stale entries are not evicted
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_then_get_now() {
        let mut cache = ScanCache::default();
        cache.put("RELIANCE", result("RELIANCE", 2900.0));
        assert_eq!(cache.get("RELIANCE").map(|r| r.symbol.as_str()), Some("RELIANCE"));
        assert!(cache.get("TCS").is_none());
    }

    #[test]
    fn put_overwrites_and_refreshes() {
        let mut cache = ScanCache::new(Duration::minutes(1));
        let t0 = Utc::now();
        cache.put_at("X", result("X", 1.0), t0);
        let t1 = t0 + Duration::minutes(5);
        assert!(cache.get_at("X", t1).is_none());

        cache.put_at("X", result("X", 2.0), t1);
        assert_eq!(cache.get_at("X", t1).map(|r| r.current_price), Some(2.0));
        assert_eq!(cache.len(), 1);
    }
}
