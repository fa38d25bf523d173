//! Error taxonomy shared by the market data source, the batch orchestrator
//! and the ranking engine.

use std::time::Duration;
use thiserror::Error;

/// Failure of one upstream request.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("could not decode upstream payload: {0}")]
    Decode(String),
}

impl FetchError {
    /// Transport errors, 5xx responses and rate limits are worth retrying;
    /// a 4xx or an undecodable payload is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::RateLimited { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_) => false,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

impl From<SeriesError> for FetchError {
    fn from(e: SeriesError) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// A series that violates chronological ordering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    #[error("candle {index} opens at {open_time}, not after previous open {previous}")]
    OutOfOrder {
        index: usize,
        open_time: i64,
        previous: i64,
    },
}

/// Why a symbol is missing from a batch result or a ranking.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("no candles returned")]
    DataUnavailable,

    #[error("needs {needed} candles, only {available} available")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("zero or missing baseline price")]
    InvalidDivisor,

    #[error(transparent)]
    Upstream(#[from] FetchError),
}

impl SkipReason {
    /// Distinguishes "delisted / nothing to rank" from "network trouble, try again".
    pub fn is_retryable(&self) -> bool {
        match self {
            SkipReason::Upstream(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// A symbol excluded from a result, with the reason.
#[derive(Debug)]
pub struct Skipped {
    pub symbol: String,
    pub reason: SkipReason,
}

impl Skipped {
    pub fn new(symbol: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            symbol: symbol.into(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_data_is_not_retryable_but_rate_limits_are() {
        assert!(!SkipReason::DataUnavailable.is_retryable());
        assert!(SkipReason::from(FetchError::RateLimited { retry_after: None }).is_retryable());
        let not_found = FetchError::Status {
            status: 400,
            body: "Invalid symbol.".into(),
        };
        assert!(!SkipReason::Upstream(not_found).is_retryable());
        let gateway = FetchError::Status {
            status: 502,
            body: String::new(),
        };
        assert!(gateway.is_retryable());
    }
}
