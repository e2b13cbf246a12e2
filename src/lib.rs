pub mod analysis;
pub mod error;
pub mod filter_utils;
pub mod indicators;
pub mod nse_client;
pub mod ports;
pub mod presets;
pub mod price_history;
pub mod results_table;
pub mod scan_cache;
pub mod scanner;
pub mod storage_utils;
pub mod tui;
