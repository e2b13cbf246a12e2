//! Daily price records and decoding of the NSE historical payload.

use anyhow::{Result, bail};
use chrono::{DateTime, Days, Months, NaiveDate};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// One trading day for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<f64>,
}

impl PricePoint {
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }

    /// Reads `field`, falling back to the close when the field was not reported.
    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open.unwrap_or(self.close),
            PriceField::High => self.high.unwrap_or(self.close),
            PriceField::Low => self.low.unwrap_or(self.close),
            PriceField::Close => self.close,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
}

/// Inclusive calendar range handed to the historical data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `end` back to the same calendar day `months` earlier.
    pub fn trailing_months(end: NaiveDate, months: u32) -> Self {
        let start = end
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Splits the range into consecutive sub-ranges of at most `days` days.
    pub fn chunks(&self, days: u32) -> Vec<DateRange> {
        let span = u64::from(days.max(1) - 1);
        let mut out = Vec::new();
        let mut start = self.start;

        while start <= self.end {
            let end = start
                .checked_add_days(Days::new(span))
                .map_or(self.end, |d| d.min(self.end));
            out.push(DateRange { start, end });
            match end.succ_opt() {
                Some(next) => start = next,
                None => break,
            }
        }
        out
    }
}

/// Sorts a series oldest first and keeps one point per date.
pub fn sort_chronologically(points: &mut Vec<PricePoint>) {
    points.sort_by_key(|p| p.date);
    points.dedup_by_key(|p| p.date);
}

// --- NSE wire format ---

#[derive(Deserialize, Debug)]
struct NseHistoricalRecord {
    #[serde(rename = "CH_TIMESTAMP", default)]
    ch_timestamp: Option<String>,
    #[serde(rename = "TIMESTAMP", default)]
    timestamp: Option<String>,
    #[serde(rename = "mTIMESTAMP", default)]
    m_timestamp: Option<String>,
    #[serde(rename = "CH_OPENING_PRICE", default, deserialize_with = "deserialize_f64_lenient")]
    open: Option<f64>,
    #[serde(rename = "CH_TRADE_HIGH_PRICE", default, deserialize_with = "deserialize_f64_lenient")]
    high: Option<f64>,
    #[serde(rename = "CH_TRADE_LOW_PRICE", default, deserialize_with = "deserialize_f64_lenient")]
    low: Option<f64>,
    #[serde(rename = "CH_CLOSING_PRICE", default, deserialize_with = "deserialize_f64_lenient")]
    close: Option<f64>,
    #[serde(rename = "CH_TOT_TRADED_QTY", default, deserialize_with = "deserialize_f64_lenient")]
    volume: Option<f64>,
}

impl NseHistoricalRecord {
    fn date(&self) -> Option<NaiveDate> {
        self.ch_timestamp
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            .or_else(|| self.timestamp.as_deref().and_then(parse_iso_date))
            .or_else(|| {
                self.m_timestamp
                    .as_deref()
                    .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%d-%b-%Y").ok())
            })
    }

    fn into_price_point(self) -> Option<PricePoint> {
        Some(PricePoint {
            date: self.date()?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close?,
            volume: self.volume,
        })
    }
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let cleaned = v.trim().replace(',', "");
        if cleaned.is_empty() || cleaned == "-" {
            Ok(None)
        } else {
            cleaned.parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

pub(crate) fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

/// Extracts the list of raw daily records from any of the shapes the NSE
/// historical endpoint (or a proxy in front of it) returns.
///
/// Chunked responses (a list of `{ data, meta }` objects) are concatenated.
/// An object without a recognised array yields an empty list; scalars are
/// rejected as malformed.
pub fn normalize_historical_payload(payload: Value) -> Result<Vec<Value>> {
    match payload {
        Value::Array(items) => {
            let chunked = items
                .iter()
                .any(|item| item.get("data").is_some_and(Value::is_array));
            if !chunked {
                return Ok(items);
            }
            Ok(items
                .into_iter()
                .filter_map(|chunk| match chunk {
                    Value::Object(mut map) => match map.remove("data") {
                        Some(Value::Array(rows)) => Some(rows),
                        _ => None,
                    },
                    _ => None,
                })
                .flatten()
                .collect())
        }
        Value::Object(mut map) => {
            for key in ["data", "candles", "records", "history"] {
                if let Some(Value::Array(rows)) = map.remove(key) {
                    return Ok(rows);
                }
            }

            let largest = map
                .iter()
                .filter_map(|(key, v)| v.as_array().map(|rows| (key.clone(), rows.len())))
                .max_by_key(|(_, len)| *len)
                .map(|(key, _)| key);

            match largest.and_then(|key| map.remove(&key)) {
                Some(Value::Array(rows)) => Ok(rows),
                _ => Ok(Vec::new()),
            }
        }
        Value::Null => bail!("payload is null"),
        other => bail!("expected a list or an object, got `{other}`"),
    }
}

/// Decodes a historical payload into a sorted, date-unique series.
/// Records without a usable date or closing price are dropped.
pub fn parse_history(payload: Value) -> Result<Vec<PricePoint>> {
    let rows = normalize_historical_payload(payload)?;

    let mut points: Vec<PricePoint> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<NseHistoricalRecord>(row).ok())
        .filter_map(NseHistoricalRecord::into_price_point)
        .collect();

    sort_chronologically(&mut points);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_fields_fall_back_to_close() {
        let p = PricePoint::from_close(day(2024, 1, 2), 101.5);
        assert_eq!(p.price(PriceField::Open), 101.5);
        assert_eq!(p.price(PriceField::High), 101.5);

        let p = PricePoint { open: Some(99.0), ..p };
        assert_eq!(p.price(PriceField::Open), 99.0);
        assert_eq!(p.price(PriceField::Close), 101.5);
    }

    #[test]
    fn trailing_year_range() {
        let r = DateRange::trailing_months(day(2024, 3, 15), 12);
        assert_eq!(r.start, day(2023, 3, 15));
        assert_eq!(r.end, day(2024, 3, 15));
    }

    #[test]
    fn chunks_cover_range_without_gaps() {
        let r = DateRange::new(day(2024, 1, 1), day(2024, 1, 10));
        let chunks = r.chunks(4);
        assert_eq!(
            chunks,
            vec![
                DateRange::new(day(2024, 1, 1), day(2024, 1, 4)),
                DateRange::new(day(2024, 1, 5), day(2024, 1, 8)),
                DateRange::new(day(2024, 1, 9), day(2024, 1, 10)),
            ]
        );
        assert_eq!(r.chunks(0).len(), 10);
    }

    #[test]
    fn decodes_lenient_nse_records() {
        let payload = json!({
            "data": [
                {
                    "CH_TIMESTAMP": "2024-01-03",
                    "CH_OPENING_PRICE": "1,200.50",
                    "CH_CLOSING_PRICE": 1210,
                    "CH_TOT_TRADED_QTY": ""
                },
                {
                    "CH_TIMESTAMP": "2024-01-02",
                    "CH_CLOSING_PRICE": "1190.25",
                    "CH_TRADE_HIGH_PRICE": null
                },
                { "CH_TIMESTAMP": "2024-01-04" },
                { "CH_CLOSING_PRICE": 1 }
            ],
            "meta": { "symbols": ["TCS"] }
        });

        let points = parse_history(payload).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, day(2024, 1, 2));
        assert_eq!(points[0].close, 1190.25);
        assert_eq!(points[0].high, None);
        assert_eq!(points[1].open, Some(1200.5));
        assert_eq!(points[1].volume, None);
    }

    #[test]
    fn falls_back_to_alternate_timestamps() {
        let payload = json!([
            { "TIMESTAMP": "2024-02-05T00:00:00.000Z", "CH_CLOSING_PRICE": 10 },
            { "mTIMESTAMP": "06-Feb-2024", "CH_CLOSING_PRICE": 11 }
        ]);
        let points = parse_history(payload).unwrap();
        assert_eq!(
            points.iter().map(|p| p.date).collect::<Vec<_>>(),
            vec![day(2024, 2, 5), day(2024, 2, 6)]
        );
    }

    #[test]
    fn concatenates_chunked_responses() {
        let payload = json!([
            { "data": [{ "CH_TIMESTAMP": "2024-01-02", "CH_CLOSING_PRICE": 1 }], "meta": {} },
            { "data": [{ "CH_TIMESTAMP": "2024-01-03", "CH_CLOSING_PRICE": 2 },
                       { "CH_TIMESTAMP": "2024-01-02", "CH_CLOSING_PRICE": 1 }], "meta": {} }
        ]);
        let points = parse_history(payload).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].close, 2.0);
    }

    #[test]
    fn uses_alternate_and_largest_arrays() {
        let rows = normalize_historical_payload(json!({ "candles": [1, 2] })).unwrap();
        assert_eq!(rows.len(), 2);

        let rows =
            normalize_historical_payload(json!({ "a": [1], "b": [1, 2, 3], "c": "x" })).unwrap();
        assert_eq!(rows.len(), 3);

        let rows = normalize_historical_payload(json!({ "status": "ok" })).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn scalars_are_malformed() {
        assert!(normalize_historical_payload(Value::Null).is_err());
        assert!(normalize_historical_payload(json!("Resource not found")).is_err());
    }
}
