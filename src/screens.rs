//! End-to-end screens: fetch a universe in chunks, score every symbol and
//! rank the results.

use crate::batch::{BatchOrchestrator, BatchReport};
use crate::candle::{Interval, Series};
use crate::error::{FetchError, SkipReason, Skipped};
use crate::extrema::find_last_local_low;
use crate::leaderboard::{DailyLeaders, daily_top_gainers};
use crate::market_data::{CandleRequest, MarketDataSource};
use crate::ranking::{
    self, MetricSelector, PerSymbolMetrics, RankOrder, RankedEntry, SortDirection, rank,
};
use crate::resample::{Alignment, aggregate};
use crate::storage_utils::{KlineConfig, ScreenConfig};
use crate::streak::{Direction, rising_closes, trailing_streak};
use crate::window_change::{InlineBaselineRanking, PreparedBaselineRanking, rank_window_change};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
    pub retryable: bool,
}

impl From<&Skipped> for SkippedSymbol {
    fn from(s: &Skipped) -> Self {
        Self {
            symbol: s.symbol.clone(),
            reason: s.reason.to_string(),
            retryable: s.reason.is_retryable(),
        }
    }
}

/// One symbol's fine series and its two boundary-aligned coarse views.
#[derive(Debug, Clone, Serialize)]
pub struct BoundaryViews {
    pub symbol: String,
    pub fine: Series,
    pub boundary_first: Series,
    pub boundary_pending: Series,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ScreenResult {
    Ranked(Vec<RankedEntry>),
    Split {
        up: Vec<RankedEntry>,
        down: Vec<RankedEntry>,
    },
    Daily(Vec<DailyLeaders>),
    Views(BoundaryViews),
}

/// Everything a rendering layer needs from one screen run.
#[derive(Debug, Serialize)]
pub struct ScreenOutput {
    pub title: String,
    /// Newest candle open time seen across the scan.
    pub last_updated_timestamp: i64,
    pub result: ScreenResult,
    pub skipped: Vec<SkippedSymbol>,
    pub cancelled: bool,
}

impl ScreenOutput {
    fn new<T>(title: impl Into<String>, result: ScreenResult, reports: &[&BatchReport<T>], last_updated: i64) -> Self {
        Self {
            title: title.into(),
            last_updated_timestamp: last_updated,
            result,
            skipped: reports
                .iter()
                .flat_map(|r| r.skipped.iter().map(SkippedSymbol::from))
                .collect(),
            cancelled: reports.iter().any(|r| r.cancelled),
        }
    }
}

fn newest_open(series: &Series) -> i64 {
    series.last().map(|c| c.open_time).unwrap_or(0)
}

fn require(series: &Series, needed: usize) -> Result<(), SkipReason> {
    if series.len() < needed {
        return Err(SkipReason::InsufficientHistory {
            needed,
            available: series.len(),
        });
    }
    Ok(())
}

pub struct Screener<'a, S: ?Sized> {
    source: &'a S,
    orchestrator: BatchOrchestrator,
    klines: KlineConfig,
    cancel: CancellationToken,
}

impl<'a, S> Screener<'a, S>
where
    S: MarketDataSource + ?Sized,
{
    pub fn new(source: &'a S, orchestrator: BatchOrchestrator, klines: KlineConfig, cancel: CancellationToken) -> Self {
        Self {
            source,
            orchestrator,
            klines,
            cancel,
        }
    }

    pub async fn run(&mut self, screen: &ScreenConfig, universe: &[String]) -> Result<ScreenOutput, FetchError> {
        info!(?screen, symbols = universe.len(), interval = %self.klines.interval, "running screen");

        let output = match screen {
            ScreenConfig::WindowChange { count, direction } => self.window_change(universe, *count, *direction).await,
            ScreenConfig::TradeCount { count } => self.trade_count(universe, *count).await,
            ScreenConfig::Streak { direction } => self.streak(universe, *direction).await,
            ScreenConfig::SwingLowRebound { width } => self.swing_low_rebound(universe, *width).await,
            ScreenConfig::FreshExtremes { max_offset } => self.fresh_extremes(universe, *max_offset).await,
            ScreenConfig::MultipleFromLow { count, min_multiple } => {
                self.multiple_from_low(universe, *count, *min_multiple).await
            }
            ScreenConfig::DailyTopGainers { days, top_n, benchmark } => {
                self.daily_top_gainers(universe, *days, *top_n, benchmark.as_deref()).await
            }
            ScreenConfig::PreparedWindowChange { anchor_time } => self.prepared_window_change(universe, *anchor_time).await,
            ScreenConfig::BoundaryViews { symbol, group_size } => {
                return self.boundary_views(symbol, *group_size).await;
            }
        };

        info!(
            title = %output.title,
            skipped = output.skipped.len(),
            cancelled = output.cancelled,
            "screen finished"
        );
        Ok(output)
    }

    async fn scan<M, T>(
        &mut self,
        universe: &[String],
        interval: Interval,
        limit: u32,
        start_time: Option<i64>,
        transform: M,
    ) -> BatchReport<T>
    where
        M: FnMut(&str, Series) -> Result<T, SkipReason>,
    {
        let source = self.source;
        self.orchestrator
            .run_with(
                universe,
                move |symbol| {
                    let mut request = CandleRequest::new(symbol, interval, limit);
                    request.start_time = start_time;
                    async move { source.get_candles(&request).await }
                },
                transform,
                &self.cancel,
            )
            .await
    }

    /// Scans with the configured interval and limit, tracking the newest candle.
    async fn scan_metrics<M>(&mut self, universe: &[String], mut metrics: M) -> (BatchReport<PerSymbolMetrics>, i64)
    where
        M: FnMut(&str, &Series) -> Result<PerSymbolMetrics, SkipReason>,
    {
        let mut latest = 0;
        let (interval, limit) = (self.klines.interval, self.klines.limit);
        let report = self
            .scan(universe, interval, limit, None, |symbol, series| {
                latest = latest.max(newest_open(&series));
                metrics(symbol, &series)
            })
            .await;
        (report, latest)
    }

    async fn window_change(&mut self, universe: &[String], count: usize, direction: SortDirection) -> ScreenOutput {
        let mut latest = 0;
        let (interval, limit) = (self.klines.interval, self.klines.limit);
        let report = self
            .scan(universe, interval, limit, None, |_, series| {
                latest = latest.max(newest_open(&series));
                // Windows clamp to the history available, but never to nothing.
                if count == 0 {
                    return Err(SkipReason::InsufficientHistory { needed: 1, available: 0 });
                }
                Ok(Series::from_unchecked(series.tail(count).to_vec()))
            })
            .await;

        let ranked = rank_window_change(&InlineBaselineRanking, &report.results, direction);
        ScreenOutput::new(
            format!("Price change over {count} x {interval}"),
            ScreenResult::Ranked(ranked),
            &[&report],
            latest,
        )
    }

    async fn trade_count(&mut self, universe: &[String], count: usize) -> ScreenOutput {
        let (report, latest) = self
            .scan_metrics(universe, |symbol, series| {
                Ok(PerSymbolMetrics {
                    price: series.last().map(|c| c.close),
                    trade_count: Some(ranking::trade_count_sum(series, count)),
                    window_change: ranking::window_change(series, count),
                    ..PerSymbolMetrics::new(symbol)
                })
            })
            .await;

        let ranked = rank(report.results.iter().map(|(_, m)| m.clone()).collect(), &RankOrder::by(MetricSelector::TradeCount));
        ScreenOutput::new(
            format!("Trades over {count} x {}", self.klines.interval),
            ScreenResult::Ranked(ranked),
            &[&report],
            latest,
        )
    }

    async fn streak(&mut self, universe: &[String], direction: Direction) -> ScreenOutput {
        let (report, latest) = self
            .scan_metrics(universe, |symbol, series| {
                let streak = trailing_streak(series, direction);
                Ok(PerSymbolMetrics {
                    price: series.last().map(|c| c.close),
                    streak_length: (!streak.is_empty()).then_some(streak.length),
                    streak_return: streak.cumulative_return(),
                    ..PerSymbolMetrics::new(symbol)
                })
            })
            .await;

        // Longest runs first; among equal runs the strongest move first.
        let by_return = match direction {
            Direction::Up => SortDirection::Descending,
            Direction::Down => SortDirection::Ascending,
        };
        let order = RankOrder::by(MetricSelector::StreakLength).then_by(MetricSelector::StreakReturn, by_return);
        let ranked = rank(report.results.iter().map(|(_, m)| m.clone()).collect(), &order);

        ScreenOutput::new(
            format!("Consecutive {direction:?} candles on {}", self.klines.interval),
            ScreenResult::Ranked(ranked),
            &[&report],
            latest,
        )
    }

    async fn swing_low_rebound(&mut self, universe: &[String], width: usize) -> ScreenOutput {
        let (report, latest) = self
            .scan_metrics(universe, |symbol, series| {
                require(series, width + 1)?;
                let mut metrics = PerSymbolMetrics {
                    price: series.last().map(|c| c.close),
                    ..PerSymbolMetrics::new(symbol)
                };
                if let Some((change, bars)) = ranking::swing_low_rebound(series, width) {
                    metrics.swing_low_rebound = Some(change);
                    metrics.extremum_offset = Some(bars - 1);
                    metrics = metrics.with_aux("bars_since_low", bars);
                }
                Ok(metrics)
            })
            .await;

        let ranked = rank(report.results.iter().map(|(_, m)| m.clone()).collect(), &RankOrder::by(MetricSelector::SwingLowRebound));
        ScreenOutput::new(
            format!("Rebound from last swing low ({width} candle lookback)"),
            ScreenResult::Ranked(ranked),
            &[&report],
            latest,
        )
    }

    async fn fresh_extremes(&mut self, universe: &[String], max_offset: usize) -> ScreenOutput {
        let (report, latest) = self
            .scan_metrics(universe, |symbol, series| {
                let mut metrics = PerSymbolMetrics {
                    price: series.last().map(|c| c.close),
                    ..PerSymbolMetrics::new(symbol)
                };
                // Low-before-high and high-before-low exclude each other.
                if let Some(up) = ranking::recovery_from_low(series) {
                    metrics.recovery_from_low = Some(up.ratio);
                    metrics.extremum_offset = Some(up.offset);
                    metrics = metrics.with_aux("position_diff", up.span);
                } else if let Some(down) = ranking::decline_from_high(series) {
                    metrics.decline_from_high = Some(down.ratio);
                    metrics.extremum_offset = Some(down.offset);
                    metrics = metrics.with_aux("position_diff", down.span);
                }
                Ok(metrics)
            })
            .await;

        let entries: Vec<PerSymbolMetrics> = report.results.iter().map(|(_, m)| m.clone()).collect();
        // Smallest moves first: the ones that have only just started.
        let up = rank(entries.clone(), &RankOrder::by(MetricSelector::RecoveryFromLow).ascending().within(max_offset));
        let down = rank(entries, &RankOrder::by(MetricSelector::DeclineFromHigh).within(max_offset));

        ScreenOutput::new(
            format!("Fresh extremes within {max_offset} candles on {}", self.klines.interval),
            ScreenResult::Split { up, down },
            &[&report],
            latest,
        )
    }

    async fn multiple_from_low(&mut self, universe: &[String], count: usize, min_multiple: f64) -> ScreenOutput {
        let (report, latest) = self
            .scan_metrics(universe, |symbol, series| {
                let mut metrics = PerSymbolMetrics {
                    price: series.last().map(|c| c.close),
                    ..PerSymbolMetrics::new(symbol)
                };
                if let Some(r) = ranking::ratio_from_window_low(series, count) {
                    metrics.ratio_from_low = Some(r.multiple);
                    metrics = metrics
                        .with_aux("low", r.low)
                        .with_aux("low_time", r.low_time)
                        .with_aux("rising_closes", rising_closes(series));
                }
                Ok(metrics)
            })
            .await;

        let mut ranked = rank(report.results.iter().map(|(_, m)| m.clone()).collect(), &RankOrder::by(MetricSelector::RatioFromLow));
        ranked.retain(|e| e.metric >= min_multiple);

        ScreenOutput::new(
            format!("At least {min_multiple}x the lowest low of {count} candles"),
            ScreenResult::Ranked(ranked),
            &[&report],
            latest,
        )
    }

    async fn daily_top_gainers(
        &mut self,
        universe: &[String],
        days: u32,
        top_n: usize,
        benchmark: Option<&str>,
    ) -> ScreenOutput {
        let mut latest = 0;
        let report = self
            .scan(universe, Interval::OneDay, days, None, |_, series| {
                latest = latest.max(newest_open(&series));
                Ok(series)
            })
            .await;

        let daily = daily_top_gainers(&report.results, top_n, benchmark);
        ScreenOutput::new(
            format!("Top {top_n} gainers per day over {days} days"),
            ScreenResult::Daily(daily),
            &[&report],
            latest,
        )
    }

    /// Captures each symbol's open at `anchor_time` from one-minute candles,
    /// then ranks the configured window against that snapshot.
    async fn prepared_window_change(&mut self, universe: &[String], anchor_time: i64) -> ScreenOutput {
        let prepare = self
            .scan(universe, Interval::OneMinute, 1, Some(anchor_time), |_, series| Ok(series))
            .await;
        let strategy = PreparedBaselineRanking::prepare(
            anchor_time,
            prepare.results.iter().map(|(s, series)| (s.as_str(), series)),
        );
        info!(prepared = strategy.len(), anchor_time, "baselines captured");

        let title = format!("Price change since {anchor_time} on {}", self.klines.interval);
        if prepare.cancelled {
            return ScreenOutput::new(title, ScreenResult::Ranked(Vec::new()), &[&prepare], 0);
        }

        let prepared: Vec<String> = universe.iter().filter(|s| strategy.contains(s)).cloned().collect();
        let mut latest = 0;
        let (interval, limit) = (self.klines.interval, self.klines.limit);
        let report = self
            .scan(&prepared, interval, limit, None, |_, series| {
                latest = latest.max(newest_open(&series));
                Ok(series)
            })
            .await;

        let ranked = rank_window_change(&strategy, &report.results, SortDirection::Descending);
        ScreenOutput::new(title, ScreenResult::Ranked(ranked), &[&prepare, &report], latest)
    }

    /// Fetches one symbol and builds both boundary-aligned coarse views.
    async fn boundary_views(&mut self, symbol: &str, group_size: usize) -> Result<ScreenOutput, FetchError> {
        let request = CandleRequest::new(symbol, self.klines.interval, self.klines.limit);
        let fine = self.source.get_candles(&request).await?;

        let views = BoundaryViews {
            symbol: symbol.to_string(),
            boundary_first: aggregate(&fine, group_size, Alignment::BoundaryFirst),
            boundary_pending: aggregate(&fine, group_size, Alignment::BoundaryPending),
            fine,
        };
        let latest = newest_open(&views.fine);

        Ok(ScreenOutput {
            title: format!("{symbol} {} x {group_size}", self.klines.interval),
            last_updated_timestamp: latest,
            result: ScreenResult::Views(views),
            skipped: Vec::new(),
            cancelled: false,
        })
    }
}

/// Position of the most recent swing low, for callers that chart it.
pub fn swing_low_marker(series: &Series, width: usize) -> Option<(i64, f64)> {
    let low = find_last_local_low(series, width);
    let index = low.position()?;
    Some((series[index].open_time, low.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ConstantDelay;
    use crate::candle::Candle;
    use crate::candle::tests::oc;
    use crate::market_data::tests::FakeSource;
    use std::time::Duration;

    const MIN: i64 = 60_000;

    fn series(points: &[(f64, f64)]) -> Series {
        Series::new(
            points
                .iter()
                .enumerate()
                .map(|(i, &(open, close))| oc(1_700_000_000_000 + i as i64 * MIN, open, close))
                .collect(),
        )
        .unwrap()
    }

    fn screener<'a>(source: &'a FakeSource, limit: u32) -> Screener<'a, FakeSource> {
        Screener::new(
            source,
            BatchOrchestrator::new(2, ConstantDelay(Duration::from_secs(60))),
            KlineConfig {
                limit,
                interval: Interval::OneMinute,
            },
            CancellationToken::new(),
        )
    }

    fn symbols(entries: &[RankedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.symbol.as_str()).collect()
    }

    fn ranked(output: &ScreenOutput) -> &[RankedEntry] {
        match &output.result {
            ScreenResult::Ranked(entries) => entries,
            other => panic!("expected a ranking, got {other:?}"),
        }
    }

    fn universe(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn window_change_ranks_and_reports_skips() {
        let source = FakeSource::default()
            .with("AUSDT", series(&[(50.0, 10.0), (10.0, 11.0), (11.0, 12.0)]))
            .with("BUSDT", series(&[(5.0, 5.0), (4.0, 5.0), (5.0, 6.0)]))
            .with("EMPTYUSDT", Series::default())
            .failing("DOWNUSDT");
        let mut screener = screener(&source, 10);
        let screen = ScreenConfig::WindowChange {
            count: 2,
            direction: SortDirection::Descending,
        };

        let output = screener
            .run(&screen, &universe(&["AUSDT", "BUSDT", "EMPTYUSDT", "DOWNUSDT"]))
            .await
            .unwrap();

        assert_eq!(symbols(ranked(&output)), ["BUSDT", "AUSDT"]);
        assert_eq!(ranked(&output)[0].metric, 0.5);
        assert_eq!(output.skipped.len(), 2);
        assert_eq!(output.skipped[0].symbol, "EMPTYUSDT");
        assert!(!output.skipped[0].retryable);
        assert!(output.skipped[1].retryable);
        assert_eq!(output.last_updated_timestamp, 1_700_000_000_000 + 2 * MIN);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_is_reported_as_skipped() {
        let source = FakeSource::default().with("AUSDT", series(&[(1.0, 2.0), (2.0, 3.0)]));
        let mut screener = screener(&source, 10);
        let screen = ScreenConfig::WindowChange {
            count: 0,
            direction: SortDirection::Descending,
        };

        let output = screener.run(&screen, &universe(&["AUSDT"])).await.unwrap();

        assert!(ranked(&output).is_empty());
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].symbol, "AUSDT");
        assert!(!output.skipped[0].retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn streak_screen_orders_by_length_then_return() {
        let source = FakeSource::default()
            .with("AUSDT", series(&[(1.0, 2.0), (2.0, 3.0)]))
            .with("BUSDT", series(&[(3.0, 1.0), (1.0, 1.5)]))
            .with("CUSDT", series(&[(1.0, 1.1), (1.1, 1.2)]))
            .with("DUSDT", series(&[(1.0, 2.0), (2.0, 1.0)]));
        let mut screener = screener(&source, 99);

        let output = screener
            .run(
                &ScreenConfig::Streak { direction: Direction::Up },
                &universe(&["AUSDT", "BUSDT", "CUSDT", "DUSDT"]),
            )
            .await
            .unwrap();

        // DUSDT ends on a down candle and is left out.
        assert_eq!(symbols(ranked(&output)), ["AUSDT", "CUSDT", "BUSDT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_extremes_split_into_up_and_down() {
        let hl = |t: i64, low: f64, high: f64, close: f64| Candle {
            open_time: t * MIN,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            trade_count: 1,
        };
        let rising = Series::new(vec![hl(0, 5.0, 6.0, 5.5), hl(1, 2.0, 4.0, 3.0), hl(2, 3.0, 9.0, 8.0), hl(3, 6.0, 8.5, 7.0)]).unwrap();
        let stale_rise = Series::new(vec![hl(0, 1.0, 2.0, 1.5), hl(1, 1.5, 9.0, 8.0), hl(2, 2.0, 3.0, 2.5), hl(3, 2.0, 3.0, 2.5)]).unwrap();
        let falling = Series::new(vec![hl(0, 7.0, 10.0, 9.0), hl(1, 4.0, 8.0, 5.0), hl(2, 2.0, 5.0, 4.0)]).unwrap();

        let source = FakeSource::default()
            .with("UPUSDT", rising)
            .with("STALEUSDT", stale_rise)
            .with("DOWNUSDT", falling);
        let mut screener = screener(&source, 30);

        let output = screener
            .run(
                &ScreenConfig::FreshExtremes { max_offset: 1 },
                &universe(&["UPUSDT", "STALEUSDT", "DOWNUSDT"]),
            )
            .await
            .unwrap();

        let ScreenResult::Split { up, down } = &output.result else {
            panic!("expected split result");
        };
        assert_eq!(symbols(up), ["UPUSDT"]);
        assert_eq!(symbols(down), ["DOWNUSDT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn swing_low_screen_flags_short_history() {
        let lows = |lows: &[f64]| {
            Series::new(
                lows.iter()
                    .enumerate()
                    .map(|(i, &low)| Candle {
                        open_time: i as i64 * MIN,
                        open: low + 1.0,
                        high: low + 2.0,
                        low,
                        close: low + 1.0,
                        volume: 1.0,
                        trade_count: 1,
                    })
                    .collect(),
            )
            .unwrap()
        };
        let source = FakeSource::default()
            .with("AUSDT", lows(&[5.0, 3.0, 4.0, 2.0, 6.0, 7.0]))
            .with("SHORTUSDT", lows(&[5.0, 3.0]));
        let mut screener = screener(&source, 99);

        let output = screener
            .run(&ScreenConfig::SwingLowRebound { width: 3 }, &universe(&["AUSDT", "SHORTUSDT"]))
            .await
            .unwrap();

        assert_eq!(symbols(ranked(&output)), ["AUSDT"]);
        assert_eq!(ranked(&output)[0].metric, 3.0);
        assert!(output.skipped[0].reason.contains("needs 4 candles"));
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_from_low_applies_threshold() {
        let source = FakeSource::default()
            .with("AUSDT", series(&[(1.0, 1.0), (1.0, 3.0)]))
            .with("BUSDT", series(&[(1.0, 1.0), (1.0, 1.5)]));
        let mut screener = screener(&source, 99);

        let output = screener
            .run(
                &ScreenConfig::MultipleFromLow {
                    count: 100,
                    min_multiple: 2.5,
                },
                &universe(&["AUSDT", "BUSDT"]),
            )
            .await
            .unwrap();

        assert_eq!(symbols(ranked(&output)), ["AUSDT"]);
        assert_eq!(ranked(&output)[0].metric, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn prepared_screen_measures_from_anchor() {
        let anchor = 1_700_000_000_000 + MIN;
        let source = FakeSource::default()
            .with("AUSDT", series(&[(10.0, 10.0), (8.0, 9.0), (9.0, 12.0)]))
            .with("BUSDT", series(&[(4.0, 4.0), (4.0, 5.0), (5.0, 7.0)]))
            .with("LATEUSDT", Series::new(vec![oc(0, 1.0, 2.0)]).unwrap());
        let mut screener = screener(&source, 10);

        let output = screener
            .run(
                &ScreenConfig::PreparedWindowChange { anchor_time: anchor },
                &universe(&["AUSDT", "BUSDT", "LATEUSDT"]),
            )
            .await
            .unwrap();

        // Baselines: A opens at 8, B at 4. LATEUSDT has nothing after the anchor.
        assert_eq!(symbols(ranked(&output)), ["BUSDT", "AUSDT"]);
        assert_eq!(ranked(&output)[1].metric, 0.5);
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].symbol, "LATEUSDT");

        let anchored = source.requests().into_iter().filter(|r| r.start_time == Some(anchor)).count();
        assert_eq!(anchored, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn daily_screen_buckets_by_date() {
        const DAY: i64 = 86_400_000;
        let day = |i: i64, open: f64, close: f64| oc(1_709_251_200_000 + i * DAY, open, close);
        let source = FakeSource::default()
            .with("BTCUSDT", Series::new(vec![day(0, 1.0, 1.01), day(1, 1.0, 1.02)]).unwrap())
            .with("AUSDT", Series::new(vec![day(0, 1.0, 2.0), day(1, 1.0, 0.5)]).unwrap());
        let mut screener = screener(&source, 99);

        let output = screener
            .run(
                &ScreenConfig::DailyTopGainers {
                    days: 2,
                    top_n: 1,
                    benchmark: Some("BTCUSDT".into()),
                },
                &universe(&["BTCUSDT", "AUSDT"]),
            )
            .await
            .unwrap();

        let ScreenResult::Daily(days) = &output.result else {
            panic!("expected daily result");
        };
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].leaders[0].symbol, "BTCUSDT");
        assert_eq!(days[1].leaders.len(), 2);
        assert!(source.requests().iter().all(|r| r.interval == Interval::OneDay && r.limit == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_views_build_both_alignments() {
        const FIVE: i64 = 5 * MIN;
        let base = 1_699_999_200_000;
        let fine = Series::new((0..5).map(|i| oc(base + i * FIVE, 1.0, 2.0)).collect()).unwrap();
        let source = FakeSource::default().with("BTCUSDT", fine);
        let mut screener = screener(&source, 140);

        let output = screener
            .run(
                &ScreenConfig::BoundaryViews {
                    symbol: "BTCUSDT".into(),
                    group_size: 2,
                },
                &[],
            )
            .await
            .unwrap();

        let ScreenResult::Views(views) = &output.result else {
            panic!("expected views");
        };
        assert_eq!(views.boundary_first.len(), 3);
        assert_eq!(views.boundary_pending.len(), 2);
        assert_eq!(output.last_updated_timestamp, base + 4 * FIVE);
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_views_propagate_upstream_errors() {
        let source = FakeSource::default().failing("BTCUSDT");
        let mut screener = screener(&source, 140);
        let screen = ScreenConfig::BoundaryViews {
            symbol: "BTCUSDT".into(),
            group_size: 2,
        };
        assert!(screener.run(&screen, &[]).await.is_err());
    }

    #[test]
    fn marks_swing_low() {
        let s = series(&[(5.0, 4.0), (4.0, 3.0), (3.0, 3.5), (3.5, 4.0)]);
        assert_eq!(swing_low_marker(&s, 1), Some((1_700_000_000_000 + MIN, 3.0)));
    }
}
