//! Client for the public NSE JSON API.
//!
//! NSE only answers API calls that carry the cookies set by its home page, so
//! the client keeps a cookie store, visits the site root before the first
//! call and once more whenever a call comes back 401/403.

use crate::error::NseError;
use crate::ports::{GainersLosers, HistoricalDataProvider, IndexMover, SymbolDirectory, SymbolInfo};
use crate::presets::split_gainers_losers;
use crate::price_history::{DateRange, PricePoint, deserialize_f64_lenient, parse_history};
use crate::storage_utils::NseConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const HISTORY_PATH: &str = "/api/historical/cm/equity";
const PRE_OPEN_PATH: &str = "/api/market-data-pre-open";
const INDEX_PATH: &str = "/api/equity-stockIndices";

pub struct NseClient {
    http: Client,
    config: NseConfig,
    session_ready: Mutex<bool>,
}

impl NseClient {
    pub fn new(config: NseConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_str(&config.base_url)?);

        let http = Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(50)
            .build()?;

        Ok(Self {
            http,
            config,
            session_ready: Mutex::new(false),
        })
    }

    async fn refresh_session(&self) -> Result<(), NseError> {
        debug!(base_url = %self.config.base_url, "refreshing NSE session cookies");
        self.http
            .get(&self.config.base_url)
            .send()
            .await
            .map_err(|source| NseError::Http {
                path: "/".to_string(),
                source,
            })?;
        Ok(())
    }

    async fn ensure_session(&self) -> Result<(), NseError> {
        let mut ready = self.session_ready.lock().await;
        if !*ready {
            self.refresh_session().await?;
            *ready = true;
        }
        Ok(())
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, NseError> {
        self.ensure_session().await?;
        let url = format!("{}{}", self.config.base_url, path);

        for attempt in 0..2 {
            let response = self
                .http
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|source| NseError::Http {
                    path: path.to_string(),
                    source,
                })?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                if attempt == 0 {
                    warn!(path, status = status.as_u16(), "NSE session rejected, retrying");
                    self.refresh_session().await?;
                    continue;
                }
                return Err(NseError::Unauthorized {
                    path: path.to_string(),
                });
            }
            if !status.is_success() {
                return Err(NseError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                });
            }

            return response.json::<Value>().await.map_err(|e| NseError::Payload {
                path: path.to_string(),
                reason: e.to_string(),
            });
        }

        Err(NseError::Unauthorized {
            path: path.to_string(),
        })
    }

    /// Daily EQ-series history, requested in `history_chunk_days` windows.
    pub async fn equity_history(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<PricePoint>, NseError> {
        let mut chunks = Vec::new();
        for chunk in range.chunks(self.config.history_chunk_days) {
            let query = [
                ("symbol", symbol.to_string()),
                ("series", r#"["EQ"]"#.to_string()),
                ("from", nse_date(chunk.start)),
                ("to", nse_date(chunk.end)),
            ];
            chunks.push(self.get_json(HISTORY_PATH, &query).await?);
        }

        let points = parse_history(Value::Array(chunks)).map_err(|e| NseError::Payload {
            path: HISTORY_PATH.to_string(),
            reason: format!("{e:#}"),
        })?;
        debug!(symbol, points = points.len(), "history fetched");
        Ok(points)
    }

    pub async fn all_symbols(&self) -> Result<Vec<SymbolInfo>, NseError> {
        let payload = self
            .get_json(PRE_OPEN_PATH, &[("key", "ALL".to_string())])
            .await?;
        parse_symbol_listing(payload).map_err(|reason| NseError::Payload {
            path: PRE_OPEN_PATH.to_string(),
            reason,
        })
    }

    pub async fn index_constituents(&self, index: &str) -> Result<Vec<IndexMover>, NseError> {
        let payload = self
            .get_json(INDEX_PATH, &[("index", index.to_string())])
            .await?;
        parse_index_rows(payload).map_err(|reason| NseError::Payload {
            path: INDEX_PATH.to_string(),
            reason,
        })
    }
}

#[async_trait]
impl HistoricalDataProvider for NseClient {
    async fn daily_history(&self, symbol: &str, range: DateRange) -> Result<Vec<PricePoint>> {
        Ok(self.equity_history(symbol, range).await?)
    }
}

#[async_trait]
impl SymbolDirectory for NseClient {
    async fn symbols(&self) -> Result<Vec<SymbolInfo>> {
        Ok(self.all_symbols().await?)
    }

    async fn gainers_losers(&self, index: &str) -> Result<GainersLosers> {
        let stocks = self.index_constituents(index).await?;
        Ok(split_gainers_losers(&stocks, index, self.config.movers_limit))
    }
}

fn nse_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

// --- Listing payloads ---

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Listing<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct PreOpenRow {
    metadata: PreOpenMetadata,
}

#[derive(Deserialize)]
struct PreOpenMetadata {
    symbol: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRow {
    symbol: String,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    p_change: Option<f64>,
    #[serde(default)]
    meta: Option<IndexRowMeta>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRowMeta {
    #[serde(default)]
    company_name: Option<String>,
}

/// Symbols of the pre-open listing, sorted and unique. Company names are not
/// part of that listing and are left empty.
fn parse_symbol_listing(payload: Value) -> Result<Vec<SymbolInfo>, String> {
    let listing: Listing<PreOpenRow> = serde_json::from_value(payload).map_err(|e| e.to_string())?;
    let mut symbols: Vec<String> = listing.data.into_iter().map(|r| r.metadata.symbol).collect();
    symbols.sort();
    symbols.dedup();
    Ok(symbols.into_iter().map(|s| SymbolInfo::new(s, "")).collect())
}

fn parse_index_rows(payload: Value) -> Result<Vec<IndexMover>, String> {
    let listing: Listing<IndexRow> = serde_json::from_value(payload).map_err(|e| e.to_string())?;
    Ok(listing
        .data
        .into_iter()
        .map(|row| IndexMover {
            company_name: row.meta.and_then(|m| m.company_name),
            p_change: row.p_change.unwrap_or(0.0),
            symbol: row.symbol,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_dates_use_nse_format() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(nse_date(d), "07-03-2024");
    }

    #[test]
    fn pre_open_listing_is_sorted_and_unique() {
        let payload = json!({
            "declines": 10,
            "data": [
                { "metadata": { "symbol": "TCS", "lastPrice": 3900 } },
                { "metadata": { "symbol": "INFY" } },
                { "metadata": { "symbol": "TCS" } }
            ]
        });
        let symbols = parse_symbol_listing(payload).unwrap();
        assert_eq!(
            symbols,
            vec![SymbolInfo::new("INFY", ""), SymbolInfo::new("TCS", "")]
        );
    }

    #[test]
    fn index_rows_accept_alternate_fields() {
        let payload = json!({
            "name": "NIFTY 50",
            "data": [
                { "symbol": "NIFTY 50", "lastPrice": "22,100.5", "pChange": 0.4 },
                { "symbol": "TCS", "ltp": 3900, "change": "12.5", "pChange": "0.32",
                  "meta": { "companyName": "Tata Consultancy Services Limited" } },
                { "symbol": "ITC", "pChange": null }
            ]
        });
        let rows = parse_index_rows(payload).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].p_change, 0.4);
        assert_eq!(rows[0].company_name, None);
        assert_eq!(rows[1].p_change, 0.32);
        assert_eq!(
            rows[1].company_name.as_deref(),
            Some("Tata Consultancy Services Limited")
        );
        assert_eq!(rows[2].p_change, 0.0);
    }

    #[test]
    fn listing_without_data_is_empty() {
        assert!(parse_index_rows(json!({ "error": "busy" })).unwrap().is_empty());
        assert!(parse_symbol_listing(json!("oops")).is_err());
    }
}
