//! The upstream market data collaborator and its Binance USDⓈ-M futures
//! implementation.

use crate::candle::{Interval, LenientNumber, Series};
use crate::error::FetchError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";

const USED_WEIGHT_HEADER: &str = "x-mbx-used-weight-1m";
const UNKNOWN: u64 = u64::MAX;

static BAN_UNTIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"until\s+(\d+)").expect("static pattern compiles"));

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandleRequest {
    pub symbol: String,
    pub interval: Interval,
    pub limit: u32,
    /// Anchors the start of the returned window when present.
    pub start_time: Option<i64>,
}

impl CandleRequest {
    pub fn new(symbol: impl Into<String>, interval: Interval, limit: u32) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            limit,
            start_time: None,
        }
    }

    pub fn starting_at(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Every tradable symbol with its latest price.
    async fn list_tickers(&self) -> Result<Vec<Ticker>, FetchError>;

    /// At most `request.limit` candles, oldest first. An empty series means
    /// the symbol has no data for the window.
    async fn get_candles(&self, request: &CandleRequest) -> Result<Series, FetchError>;
}

/// Rate limit feedback shared between a data source and the batch delay
/// policy that paces it.
#[derive(Debug)]
pub struct RateLimitGauge {
    used_weight: AtomicU64,
    banned_until_ms: AtomicU64,
}

impl Default for RateLimitGauge {
    fn default() -> Self {
        Self {
            used_weight: AtomicU64::new(UNKNOWN),
            banned_until_ms: AtomicU64::new(0),
        }
    }
}

impl RateLimitGauge {
    pub fn record_used_weight(&self, weight: u64) {
        self.used_weight.store(weight, Ordering::Relaxed);
    }

    /// Request weight consumed in the current minute, if the upstream told us.
    pub fn used_weight(&self) -> Option<u64> {
        match self.used_weight.load(Ordering::Relaxed) {
            UNKNOWN => None,
            w => Some(w),
        }
    }

    pub fn record_ban_until(&self, until_ms: u64) {
        self.banned_until_ms.fetch_max(until_ms, Ordering::Relaxed);
    }

    /// Time left on an upstream ban, relative to `now_ms`.
    pub fn retry_after(&self, now_ms: u64) -> Option<Duration> {
        let until = self.banned_until_ms.load(Ordering::Relaxed);
        (until > now_ms).then(|| Duration::from_millis(until - now_ms))
    }
}

/// Request weight Binance charges for one klines call of `limit` candles.
pub fn request_weight(limit: u32) -> u32 {
    match limit {
        0..=99 => 1,
        100..=499 => 2,
        500..=1000 => 5,
        _ => 10,
    }
}

/// Largest chunk that stays under 90% of the per-minute weight budget.
pub fn suggested_chunk_size(weight_limit_per_minute: u32, kline_limit: u32) -> usize {
    let safe_capacity = (weight_limit_per_minute as f64 * 0.90) as u32;
    std::cmp::max(1, safe_capacity / request_weight(kline_limit)) as usize
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Deserialize)]
struct RawTicker {
    symbol: String,
    price: LenientNumber,
}

pub struct BinanceFutures {
    client: Client,
    base_url: String,
    gauge: std::sync::Arc<RateLimitGauge>,
}

impl BinanceFutures {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder().pool_max_idle_per_host(50).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            gauge: Default::default(),
        })
    }

    pub fn gauge(&self) -> std::sync::Arc<RateLimitGauge> {
        self.gauge.clone()
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(url).query(query).send().await?;
        self.observe_weight(&response);

        let status = response.status();
        if status == StatusCode::IM_A_TEAPOT || status == StatusCode::TOO_MANY_REQUESTS {
            let header_wait = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            let retry_after = self.parse_ban(&body).or(header_wait);

            warn!(%status, ?retry_after, "rate limited by upstream");
            return Err(FetchError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn observe_weight(&self, response: &Response) {
        if let Some(weight) = response
            .headers()
            .get(USED_WEIGHT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.gauge.record_used_weight(weight);
        }
    }

    /// Reads `... banned until 1700000000000 ...` (error -1003) and records it.
    fn parse_ban(&self, body: &str) -> Option<Duration> {
        let until: u64 = BAN_UNTIL.captures(body)?.get(1)?.as_str().parse().ok()?;
        self.gauge.record_ban_until(until);
        self.gauge.retry_after(now_ms())
    }
}

#[async_trait]
impl MarketDataSource for BinanceFutures {
    async fn list_tickers(&self) -> Result<Vec<Ticker>, FetchError> {
        let body = self.get("/fapi/v1/ticker/price", &[]).await?;
        let raw: Vec<RawTicker> = serde_json::from_slice(&body)?;

        Ok(raw
            .into_iter()
            .filter_map(|t| {
                Some(Ticker {
                    price: t.price.0?,
                    symbol: t.symbol,
                })
            })
            .collect())
    }

    async fn get_candles(&self, request: &CandleRequest) -> Result<Series, FetchError> {
        let mut query = vec![
            ("symbol", request.symbol.clone()),
            ("interval", request.interval.as_str().to_string()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(start) = request.start_time {
            query.push(("startTime", start.to_string()));
        }

        let body = self.get("/fapi/v1/klines", &query).await?;
        let rows: Vec<Vec<LenientNumber>> = serde_json::from_slice(&body)?;
        let series = Series::from_rows(&rows)?;

        debug!(symbol = %request.symbol, candles = series.len(), "klines fetched");
        Ok(series)
    }
}
