//! Chunked, rate-limited retrieval across a large symbol universe.
//!
//! Symbols in a chunk are fetched concurrently and the orchestrator waits
//! for all of them before it cools down and moves to the next chunk. Output
//! order always follows universe order.

use crate::candle::Series;
use crate::error::{FetchError, SkipReason, Skipped};
use crate::market_data::{RateLimitGauge, now_ms};
use crate::storage_utils::DelayConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What the orchestrator saw during the chunk that just finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkObservation {
    pub chunk_index: usize,
    pub chunk_len: usize,
    pub next_chunk_len: usize,
    pub elapsed: Duration,
    pub failures: usize,
    /// Longest ban the upstream announced during the chunk.
    pub retry_after: Option<Duration>,
}

/// Chooses how long to pause between two chunks.
pub trait DelayPolicy: Send {
    fn cooldown(&mut self, observed: &ChunkObservation) -> Duration;
}

/// Fixed pause regardless of headroom.
#[derive(Debug, Clone, Copy)]
pub struct ConstantDelay(pub Duration);

impl Default for ConstantDelay {
    fn default() -> Self {
        ConstantDelay(Duration::from_secs(60))
    }
}

impl DelayPolicy for ConstantDelay {
    fn cooldown(&mut self, _observed: &ChunkObservation) -> Duration {
        self.0
    }
}

/// Waits out the remainder of a rate-limit window that started with the chunk.
#[derive(Debug, Clone, Copy)]
pub struct WindowAwareDelay {
    pub window: Duration,
}

impl DelayPolicy for WindowAwareDelay {
    fn cooldown(&mut self, observed: &ChunkObservation) -> Duration {
        self.window.saturating_sub(observed.elapsed)
    }
}

/// Skips the pause while the upstream reports enough weight left for the
/// next chunk; honours bans; otherwise behaves like [`WindowAwareDelay`].
#[derive(Debug, Clone)]
pub struct AdaptiveDelay {
    pub gauge: Arc<RateLimitGauge>,
    pub weight_limit: u64,
    pub weight_per_request: u64,
    pub window: Duration,
}

impl DelayPolicy for AdaptiveDelay {
    fn cooldown(&mut self, observed: &ChunkObservation) -> Duration {
        let ban = observed.retry_after.max(self.gauge.retry_after(now_ms()));
        if let Some(wait) = ban {
            return wait;
        }

        let needed = observed.next_chunk_len as u64 * self.weight_per_request;
        match self.gauge.used_weight() {
            Some(used) if used + needed <= self.weight_limit => Duration::ZERO,
            _ => self.window.saturating_sub(observed.elapsed),
        }
    }
}

/// Classic token bucket: each request costs `cost_per_request` tokens,
/// tokens refill continuously up to `capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    cost_per_request: f64,
}

impl TokenBucket {
    /// Starts full.
    pub fn new(capacity: f64, refill_per_sec: f64, cost_per_request: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            cost_per_request,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

impl DelayPolicy for TokenBucket {
    fn cooldown(&mut self, observed: &ChunkObservation) -> Duration {
        let refilled = self.tokens + observed.elapsed.as_secs_f64() * self.refill_per_sec;
        self.tokens = refilled.min(self.capacity) - observed.chunk_len as f64 * self.cost_per_request;

        let needed = (observed.next_chunk_len as f64 * self.cost_per_request).min(self.capacity);
        if self.tokens >= needed || self.refill_per_sec <= 0.0 {
            return Duration::ZERO;
        }

        let wait = (needed - self.tokens) / self.refill_per_sec;
        self.tokens = needed;
        Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX)
    }
}

/// Builds the configured policy. `gauge` feeds the adaptive variant.
pub fn build_delay_policy(
    config: &DelayConfig,
    gauge: Arc<RateLimitGauge>,
    weight_limit: u64,
    weight_per_request: u64,
) -> Box<dyn DelayPolicy> {
    match *config {
        DelayConfig::Constant { secs } => Box::new(ConstantDelay(Duration::from_secs(secs))),
        DelayConfig::WindowAware { window_secs } => Box::new(WindowAwareDelay {
            window: Duration::from_secs(window_secs),
        }),
        DelayConfig::Adaptive { window_secs } => Box::new(AdaptiveDelay {
            gauge,
            weight_limit,
            weight_per_request,
            window: Duration::from_secs(window_secs),
        }),
        DelayConfig::TokenBucket { capacity, refill_per_sec } => Box::new(TokenBucket::new(
            capacity,
            refill_per_sec,
            weight_per_request as f64,
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Fetching { chunk: usize },
    CoolingDown { after_chunk: usize },
    Done,
    Cancelled,
}

/// Combined outcome of one run.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Successful symbols in universe order.
    pub results: Vec<(String, T)>,
    pub skipped: Vec<Skipped>,
    pub chunks: usize,
    pub delays: usize,
    pub cancelled: bool,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            skipped: Vec::new(),
            chunks: 0,
            delays: 0,
            cancelled: false,
        }
    }
}

impl<T> BatchReport<T> {
    /// Symbols lost to upstream errors rather than missing data.
    pub fn upstream_failures(&self) -> impl Iterator<Item = &Skipped> {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Upstream(_)))
    }

    /// Symbols worth fetching again later.
    pub fn retryable_symbols(&self) -> Vec<&str> {
        self.skipped
            .iter()
            .filter(|s| s.reason.is_retryable())
            .map(|s| s.symbol.as_str())
            .collect()
    }
}

pub struct BatchOrchestrator {
    chunk_size: usize,
    delay: Box<dyn DelayPolicy>,
    state: BatchState,
}

impl BatchOrchestrator {
    pub fn new(chunk_size: usize, delay: impl DelayPolicy + 'static) -> Self {
        Self::with_boxed_policy(chunk_size, Box::new(delay))
    }

    pub fn with_boxed_policy(chunk_size: usize, delay: Box<dyn DelayPolicy>) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            delay,
            state: BatchState::Idle,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Fetches every symbol and keeps the non-empty series.
    pub async fn run<F, Fut>(
        &mut self,
        universe: &[String],
        fetch: F,
        cancel: &CancellationToken,
    ) -> BatchReport<Series>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Series, FetchError>>,
    {
        self.run_with(universe, fetch, |_, series| Ok(series), cancel).await
    }

    /// Fetches every symbol and applies `transform` to each non-empty series
    /// as its chunk completes. A transform error skips that symbol only.
    pub async fn run_with<F, Fut, M, T>(
        &mut self,
        universe: &[String],
        fetch: F,
        mut transform: M,
        cancel: &CancellationToken,
    ) -> BatchReport<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Series, FetchError>>,
        M: FnMut(&str, Series) -> Result<T, SkipReason>,
    {
        let chunks: Vec<&[String]> = universe.chunks(self.chunk_size).collect();
        let mut report = BatchReport::default();
        self.state = BatchState::Idle;

        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.cancelled(report);
            }

            self.state = BatchState::Fetching { chunk: i };
            let started = Instant::now();
            let outcomes = futures::future::join_all(chunk.iter().map(|s| fetch(s.clone()))).await;
            report.chunks += 1;

            let mut failures = 0;
            let mut retry_after: Option<Duration> = None;

            for (symbol, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(series) if series.is_empty() => {
                        report.skipped.push(Skipped::new(symbol, SkipReason::DataUnavailable));
                    }
                    Ok(series) => match transform(symbol, series) {
                        Ok(value) => report.results.push((symbol.clone(), value)),
                        Err(reason) => report.skipped.push(Skipped::new(symbol, reason)),
                    },
                    Err(err) => {
                        failures += 1;
                        if let FetchError::RateLimited { retry_after: Some(wait) } = &err {
                            retry_after = retry_after.max(Some(*wait));
                        }
                        warn!(%symbol, error = %err, "fetch failed, continuing");
                        report.skipped.push(Skipped::new(symbol, SkipReason::Upstream(err)));
                    }
                }
            }

            let elapsed = started.elapsed();
            info!(
                chunk = i + 1,
                of = chunks.len(),
                symbols = chunk.len(),
                failures,
                elapsed_ms = elapsed.as_millis() as u64,
                "chunk processed"
            );

            let Some(next) = chunks.get(i + 1) else {
                break;
            };

            self.state = BatchState::CoolingDown { after_chunk: i };
            let wait = self.delay.cooldown(&ChunkObservation {
                chunk_index: i,
                chunk_len: chunk.len(),
                next_chunk_len: next.len(),
                elapsed,
                failures,
                retry_after,
            });
            report.delays += 1;
            info!(wait_secs = wait.as_secs_f64(), "cooling down before next chunk");

            tokio::select! {
                _ = cancel.cancelled() => return self.cancelled(report),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.state = BatchState::Done;
        report
    }

    fn cancelled<T>(&mut self, mut report: BatchReport<T>) -> BatchReport<T> {
        info!(chunks = report.chunks, "batch run cancelled");
        self.state = BatchState::Cancelled;
        report.cancelled = true;
        report
    }
}
