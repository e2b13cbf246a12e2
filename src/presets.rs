//! Named symbol universes for a scan.

use crate::ports::{GainersLosers, IndexMover, SymbolDirectory, SymbolInfo};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Index whose constituents feed the gainers/losers presets.
pub const DEFAULT_MOVERS_INDEX: &str = "NIFTY 50";
pub const DEFAULT_MOVERS_LIMIT: usize = 10;

// Large caps scanned by the NIFTY 50 preset.
#[rustfmt::skip]
const NIFTY50_CORE: &[&str] = &[
    "RELIANCE", "TCS", "HDFCBANK", "INFY", "ICICIBANK",
    "HINDUNILVR", "ITC", "HDFC", "SBIN", "BHARTIARTL",
    "KOTAKBANK", "BAJFINANCE", "AXISBANK", "LT", "ASIANPAINT",
    "HCLTECH", "MARUTI", "SUNPHARMA", "TITAN", "BAJAJFINSV",
    "TATAMOTORS", "ULTRACEMCO", "M&M", "ADANIENT", "TATASTEEL",
    "NTPC", "POWERGRID", "ONGC", "GRASIM", "HINDALCO",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPreset {
    #[default]
    Nifty50,
    Nifty100,
    Nifty200,
    Gainers,
    Losers,
    Custom,
}

impl ScanPreset {
    pub const ALL: [ScanPreset; 6] = [
        ScanPreset::Nifty50,
        ScanPreset::Nifty100,
        ScanPreset::Nifty200,
        ScanPreset::Gainers,
        ScanPreset::Losers,
        ScanPreset::Custom,
    ];

    pub fn description(self) -> &'static str {
        match self {
            ScanPreset::Nifty50 => "NIFTY 50 stocks",
            ScanPreset::Nifty100 => "NIFTY 100 stocks",
            ScanPreset::Nifty200 => "NIFTY 200 stocks",
            ScanPreset::Gainers => "Today's top gainers",
            ScanPreset::Losers => "Today's top losers",
            ScanPreset::Custom => "All listed symbols",
        }
    }

    fn needs_movers(self) -> bool {
        matches!(self, ScanPreset::Gainers | ScanPreset::Losers)
    }
}

impl fmt::Display for ScanPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanPreset::Nifty50 => "NIFTY 50",
            ScanPreset::Nifty100 => "NIFTY 100",
            ScanPreset::Nifty200 => "NIFTY 200",
            ScanPreset::Gainers => "Gainers",
            ScanPreset::Losers => "Losers",
            ScanPreset::Custom => "Custom",
        })
    }
}

impl FromStr for ScanPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "nifty50" => Ok(ScanPreset::Nifty50),
            "nifty100" => Ok(ScanPreset::Nifty100),
            "nifty200" => Ok(ScanPreset::Nifty200),
            "gainers" => Ok(ScanPreset::Gainers),
            "losers" => Ok(ScanPreset::Losers),
            "custom" | "all" => Ok(ScanPreset::Custom),
            _ => Err(format!("unknown preset `{s}`")),
        }
    }
}

/// Picks the symbols for `preset` out of the directory listing.
///
/// Movers are only consulted for the gainers/losers presets. A mover's own
/// company name wins, then the directory's, then the symbol itself.
pub fn resolve_symbols(
    preset: ScanPreset,
    directory: &[SymbolInfo],
    movers: Option<&GainersLosers>,
) -> Vec<SymbolInfo> {
    match preset {
        ScanPreset::Nifty50 => directory
            .iter()
            .filter(|s| NIFTY50_CORE.contains(&s.symbol.as_str()))
            .cloned()
            .collect(),
        ScanPreset::Nifty100 => directory.iter().take(100).cloned().collect(),
        ScanPreset::Nifty200 => directory.iter().take(200).cloned().collect(),
        ScanPreset::Gainers => movers.map_or_else(Vec::new, |m| with_names(&m.gainers, directory)),
        ScanPreset::Losers => movers.map_or_else(Vec::new, |m| with_names(&m.losers, directory)),
        ScanPreset::Custom => directory.to_vec(),
    }
}

fn with_names(movers: &[IndexMover], directory: &[SymbolInfo]) -> Vec<SymbolInfo> {
    let names: HashMap<&str, &str> = directory
        .iter()
        .filter(|s| !s.company_name.is_empty())
        .map(|s| (s.symbol.as_str(), s.company_name.as_str()))
        .collect();

    movers
        .iter()
        .map(|m| {
            let name = m
                .company_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .or_else(|| names.get(m.symbol.as_str()).copied())
                .unwrap_or(m.symbol.as_str());
            SymbolInfo::new(m.symbol.as_str(), name)
        })
        .collect()
}

/// Fetches whatever `preset` needs from the directory and resolves it.
pub async fn load_preset(
    preset: ScanPreset,
    directory: &dyn SymbolDirectory,
    movers_index: &str,
) -> Result<Vec<SymbolInfo>> {
    let listing = directory.symbols().await?;
    let movers = if preset.needs_movers() {
        Some(directory.gainers_losers(movers_index).await?)
    } else {
        None
    };
    Ok(resolve_symbols(preset, &listing, movers.as_ref()))
}

/// Splits index constituents into the top `limit` gainers (largest positive
/// change first) and losers (largest negative change first). The row that
/// represents the index itself is ignored.
pub fn split_gainers_losers(stocks: &[IndexMover], index: &str, limit: usize) -> GainersLosers {
    let constituents = stocks.iter().filter(|s| s.symbol != index);

    let mut gainers: Vec<IndexMover> = constituents
        .clone()
        .filter(|s| s.p_change > 0.0)
        .cloned()
        .collect();
    gainers.sort_by(|a, b| b.p_change.partial_cmp(&a.p_change).unwrap_or(Ordering::Equal));
    gainers.truncate(limit);

    let mut losers: Vec<IndexMover> = constituents
        .filter(|s| s.p_change < 0.0)
        .cloned()
        .collect();
    losers.sort_by(|a, b| a.p_change.partial_cmp(&b.p_change).unwrap_or(Ordering::Equal));
    losers.truncate(limit);

    GainersLosers { gainers, losers }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Vec<SymbolInfo> {
        let mut listing = vec![
            SymbolInfo::new("AAVAS", ""),
            SymbolInfo::new("TCS", "Tata Consultancy Services Limited"),
            SymbolInfo::new("RELIANCE", "Reliance Industries Limited"),
        ];
        listing.extend((0..250).map(|i| SymbolInfo::new(format!("SYM{i}"), "")));
        listing
    }

    fn mover(symbol: &str, p_change: f64) -> IndexMover {
        IndexMover {
            symbol: symbol.to_string(),
            company_name: None,
            p_change,
        }
    }

    #[test]
    fn nifty50_keeps_directory_order() {
        let picked = resolve_symbols(ScanPreset::Nifty50, &directory(), None);
        let symbols: Vec<_> = picked.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, ["TCS", "RELIANCE"]);
    }

    #[test]
    fn prefix_presets_take_leading_entries() {
        let listing = directory();
        assert_eq!(resolve_symbols(ScanPreset::Nifty100, &listing, None).len(), 100);
        assert_eq!(resolve_symbols(ScanPreset::Nifty200, &listing, None).len(), 200);
        assert_eq!(resolve_symbols(ScanPreset::Custom, &listing, None).len(), 253);
    }

    #[test]
    fn movers_use_directory_names() {
        let movers = GainersLosers {
            gainers: vec![mover("TCS", 2.0), mover("ZOMATO", 1.0)],
            losers: vec![mover("AAVAS", -1.0)],
        };
        let gainers = resolve_symbols(ScanPreset::Gainers, &directory(), Some(&movers));
        assert_eq!(gainers[0].company_name, "Tata Consultancy Services Limited");
        assert_eq!(gainers[1].company_name, "ZOMATO");

        let losers = resolve_symbols(ScanPreset::Losers, &directory(), Some(&movers));
        assert_eq!(losers, vec![SymbolInfo::new("AAVAS", "AAVAS")]);

        assert!(resolve_symbols(ScanPreset::Gainers, &directory(), None).is_empty());
    }

    #[test]
    fn mover_company_name_wins_over_directory() {
        let listing = vec![
            SymbolInfo::new("TCS", ""),
            SymbolInfo::new("RELIANCE", "Reliance Industries Limited"),
        ];
        let mut tcs = mover("TCS", 1.5);
        tcs.company_name = Some("Tata Consultancy Services Limited".to_string());
        let mut blank = mover("RELIANCE", 0.8);
        blank.company_name = Some(String::new());
        let movers = GainersLosers {
            gainers: vec![tcs, blank],
            losers: Vec::new(),
        };

        let gainers = resolve_symbols(ScanPreset::Gainers, &listing, Some(&movers));
        assert_eq!(
            gainers,
            vec![
                SymbolInfo::new("TCS", "Tata Consultancy Services Limited"),
                SymbolInfo::new("RELIANCE", "Reliance Industries Limited"),
            ]
        );
    }

    #[test]
    fn split_sorts_and_truncates() {
        let stocks = vec![
            mover("NIFTY 50", 0.8),
            mover("A", 1.5),
            mover("B", -0.5),
            mover("C", 3.0),
            mover("D", -2.5),
            mover("E", 0.0),
            mover("F", 0.2),
        ];
        let split = split_gainers_losers(&stocks, "NIFTY 50", 2);
        let g: Vec<_> = split.gainers.iter().map(|m| m.symbol.as_str()).collect();
        let l: Vec<_> = split.losers.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(g, ["C", "A"]);
        assert_eq!(l, ["D", "B"]);
    }

    #[test]
    fn preset_parsing() {
        assert_eq!("NIFTY 50".parse::<ScanPreset>(), Ok(ScanPreset::Nifty50));
        assert_eq!("nifty-200".parse::<ScanPreset>(), Ok(ScanPreset::Nifty200));
        assert_eq!("Losers".parse::<ScanPreset>(), Ok(ScanPreset::Losers));
        assert!("midcap".parse::<ScanPreset>().is_err());
    }
}
