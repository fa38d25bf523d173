//! Per-symbol metric families and the stable ranking over them.

use crate::candle::Series;
use crate::extrema::{find_last_local_low, window_extremes};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// `numerator / denominator`, or `None` when the denominator is zero or the
/// result is not a finite number.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    let value = numerator / denominator;
    value.is_finite().then_some(value)
}

// --- Metric families ---

/// `(latest close - open of the first of the newest n candles) / that open`.
pub fn window_change(series: &Series, n: usize) -> Option<f64> {
    let window = series.tail(n);
    let first = window.first()?;
    let latest = window.last()?;
    ratio(latest.close - first.open, first.open)
}

/// Sum of trade counts over the newest `n` candles.
pub fn trade_count_sum(series: &Series, n: usize) -> u64 {
    series.tail(n).iter().map(|c| c.trade_count).sum()
}

/// A move measured from a window extreme to the latest close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtremeMove {
    pub ratio: f64,
    /// Candles between the freshest extreme and the newest candle.
    pub offset: usize,
    /// Candles between the two extremes.
    pub span: usize,
}

/// Rise from the window low, valid only when the low comes before the high
/// (the move is a recovery, not a decline still in progress). `offset`
/// counts from the high.
pub fn recovery_from_low(series: &Series) -> Option<ExtremeMove> {
    let ext = window_extremes(series)?;
    let close = series.last()?.close;
    let change = ratio(close - ext.low, ext.low)?;

    (change > 0.0 && ext.low_index < ext.high_index).then(|| ExtremeMove {
        ratio: change,
        offset: series.len() - 1 - ext.high_index,
        span: ext.high_index - ext.low_index,
    })
}

/// Drop from the window high, valid only when the high comes before the low.
/// `offset` counts from the low.
pub fn decline_from_high(series: &Series) -> Option<ExtremeMove> {
    let ext = window_extremes(series)?;
    let close = series.last()?.close;
    let change = ratio(close - ext.high, ext.high)?;

    (change < 0.0 && ext.high_index < ext.low_index).then(|| ExtremeMove {
        ratio: change,
        offset: series.len() - 1 - ext.low_index,
        span: ext.low_index - ext.high_index,
    })
}

/// Rise of the latest close above the most recent swing low, with the number
/// of candles from the low to the series end (inclusive of the low).
pub fn swing_low_rebound(series: &Series, width: usize) -> Option<(f64, usize)> {
    let low = find_last_local_low(series, width);
    let index = low.position()?;
    let close = series.last()?.close;
    let change = ratio(close - low.value, low.value)?;
    Some((change, series.len() - index))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowLowRatio {
    /// `latest close / lowest low`.
    pub multiple: f64,
    pub low: f64,
    pub low_time: i64,
}

/// How many times over the latest close sits above the lowest low of the
/// newest `n` candles.
pub fn ratio_from_window_low(series: &Series, n: usize) -> Option<WindowLowRatio> {
    let window = series.tail(n);
    let ext = window_extremes(window)?;
    let close = window.last()?.close;

    Some(WindowLowRatio {
        multiple: ratio(close, ext.low)?,
        low: ext.low,
        low_time: window[ext.low_index].open_time,
    })
}

/// Whether an extreme `offset` candles from the end is fresh enough.
pub fn within_proximity(offset: usize, max_offset: usize) -> bool {
    offset <= max_offset
}

// --- Ranking ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuxValue {
    Int(i64),
    Float(f64),
}

impl From<f64> for AuxValue {
    fn from(v: f64) -> Self {
        AuxValue::Float(v)
    }
}

impl From<usize> for AuxValue {
    fn from(v: usize) -> Self {
        AuxValue::Int(v as i64)
    }
}

impl From<u64> for AuxValue {
    fn from(v: u64) -> Self {
        AuxValue::Int(v as i64)
    }
}

impl From<i64> for AuxValue {
    fn from(v: i64) -> Self {
        AuxValue::Int(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSelector {
    WindowChange,
    TradeCount,
    RecoveryFromLow,
    DeclineFromHigh,
    RatioFromLow,
    SwingLowRebound,
    StreakLength,
    StreakReturn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Descending,
    Ascending,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Descending => ordering.reverse(),
            SortDirection::Ascending => ordering,
        }
    }
}

/// Metrics computed for one symbol; a `None` metric excludes the symbol from
/// rankings on that metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerSymbolMetrics {
    pub symbol: String,
    pub price: Option<f64>,
    pub window_change: Option<f64>,
    pub trade_count: Option<u64>,
    pub recovery_from_low: Option<f64>,
    pub decline_from_high: Option<f64>,
    pub ratio_from_low: Option<f64>,
    pub swing_low_rebound: Option<f64>,
    pub streak_length: Option<usize>,
    pub streak_return: Option<f64>,
    /// Candles between the relevant extreme and the series end.
    pub extremum_offset: Option<usize>,
    pub auxiliary: BTreeMap<String, AuxValue>,
}

impl PerSymbolMetrics {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn with_aux(mut self, key: &str, value: impl Into<AuxValue>) -> Self {
        self.auxiliary.insert(key.to_string(), value.into());
        self
    }

    pub fn metric(&self, selector: MetricSelector) -> Option<f64> {
        match selector {
            MetricSelector::WindowChange => self.window_change,
            MetricSelector::TradeCount => self.trade_count.map(|t| t as f64),
            MetricSelector::RecoveryFromLow => self.recovery_from_low,
            MetricSelector::DeclineFromHigh => self.decline_from_high,
            MetricSelector::RatioFromLow => self.ratio_from_low,
            MetricSelector::SwingLowRebound => self.swing_low_rebound,
            MetricSelector::StreakLength => self.streak_length.map(|l| l as f64),
            MetricSelector::StreakReturn => self.streak_return,
        }
    }
}

/// Which metric to sort by, in which direction, and what to filter out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOrder {
    pub selector: MetricSelector,
    pub direction: SortDirection,
    pub tiebreak: Option<(MetricSelector, SortDirection)>,
    /// Maximum `extremum_offset` an entry may have.
    pub proximity: Option<usize>,
}

impl RankOrder {
    pub fn by(selector: MetricSelector) -> Self {
        Self {
            selector,
            direction: SortDirection::Descending,
            tiebreak: None,
            proximity: None,
        }
    }

    pub fn ascending(mut self) -> Self {
        self.direction = SortDirection::Ascending;
        self
    }

    pub fn then_by(mut self, selector: MetricSelector, direction: SortDirection) -> Self {
        self.tiebreak = Some((selector, direction));
        self
    }

    pub fn within(mut self, max_offset: usize) -> Self {
        self.proximity = Some(max_offset);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub symbol: String,
    pub metric: f64,
    pub auxiliary: BTreeMap<String, AuxValue>,
}

/// Stable sort of `entries` on the selected metric. Entries lacking a finite
/// value for the metric, or outside the proximity bound, are dropped.
pub fn rank(entries: Vec<PerSymbolMetrics>, order: &RankOrder) -> Vec<RankedEntry> {
    let mut kept: Vec<(f64, Option<f64>, PerSymbolMetrics)> = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(metric) = entry.metric(order.selector).filter(|m| m.is_finite()) else {
            debug!(symbol = %entry.symbol, selector = ?order.selector, "skipping entry without a usable metric");
            continue;
        };

        if let Some(max) = order.proximity {
            match entry.extremum_offset {
                Some(offset) if within_proximity(offset, max) => {}
                offset => {
                    debug!(symbol = %entry.symbol, ?offset, max, "skipping stale extreme");
                    continue;
                }
            }
        }

        let secondary = order
            .tiebreak
            .and_then(|(selector, _)| entry.metric(selector))
            .filter(|m| m.is_finite());
        kept.push((metric, secondary, entry));
    }

    kept.sort_by(|a, b| {
        let primary = order.direction.apply(a.0.total_cmp(&b.0));
        primary.then_with(|| match (order.tiebreak, a.1, b.1) {
            (Some((_, direction)), Some(x), Some(y)) => direction.apply(x.total_cmp(&y)),
            _ => Ordering::Equal,
        })
    });

    kept.into_iter()
        .map(|(metric, _, entry)| RankedEntry {
            auxiliary: standard_auxiliary(&entry),
            symbol: entry.symbol,
            metric,
        })
        .collect()
}

fn standard_auxiliary(entry: &PerSymbolMetrics) -> BTreeMap<String, AuxValue> {
    let mut aux = entry.auxiliary.clone();
    let mut put = |key: &str, value: Option<AuxValue>| {
        if let Some(v) = value {
            aux.entry(key.to_string()).or_insert(v);
        }
    };

    put("price", entry.price.map(AuxValue::from));
    put("window_change", entry.window_change.map(AuxValue::from));
    put("trade_count", entry.trade_count.map(AuxValue::from));
    put("streak_length", entry.streak_length.map(AuxValue::from));
    put("position_offset", entry.extremum_offset.map(AuxValue::from));
    aux
}
