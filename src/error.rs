use thiserror::Error;

/// Why a symbol produced no result during a scan.
///
/// Skips are absorbed by the orchestrator; they only surface in the
/// [`ScanReport`](crate::scanner::ScanReport) for diagnostics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    #[error("history fetch failed for {symbol}: {reason}")]
    Fetch { symbol: String, reason: String },

    #[error("malformed history payload for {symbol}: {reason}")]
    MalformedPayload { symbol: String, reason: String },

    #[error("{symbol} appears more than once in this scan")]
    Duplicate { symbol: String },
}

/// Failures talking to the NSE JSON API.
#[derive(Debug, Error)]
pub enum NseError {
    #[error("request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("NSE rejected {path} with status {status}")]
    Status { path: String, status: u16 },

    #[error("NSE session refused after re-authentication ({path})")]
    Unauthorized { path: String },

    #[error("unexpected payload from {path}: {reason}")]
    Payload { path: String, reason: String },
}
