//! Two ways of choosing the baseline a window price change is measured from.
//!
//! `InlineBaselineRanking` takes the open of the first candle of each
//! freshly fetched window. `PreparedBaselineRanking` captures one open price
//! per symbol at an anchor time up front, and every later ranking measures
//! against that snapshot.

use crate::candle::Series;
use crate::ranking::{MetricSelector, PerSymbolMetrics, RankOrder, RankedEntry, SortDirection, rank, ratio};
use std::collections::HashMap;
use tracing::debug;

pub trait BaselineStrategy {
    fn name(&self) -> &'static str;

    /// Baseline open price for `symbol`, given its latest window.
    fn baseline(&self, symbol: &str, window: &Series) -> Option<f64>;

    /// Change of the window's latest close relative to the baseline.
    fn change(&self, symbol: &str, window: &Series) -> Option<f64> {
        let base = self.baseline(symbol, window)?;
        let close = window.last()?.close;
        ratio(close - base, base)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineBaselineRanking;

impl BaselineStrategy for InlineBaselineRanking {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn baseline(&self, _symbol: &str, window: &Series) -> Option<f64> {
        window.first().map(|c| c.open)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreparedBaselineRanking {
    anchor_time: i64,
    baselines: HashMap<String, f64>,
}

impl PreparedBaselineRanking {
    /// Takes the open of each symbol's first candle at or after `anchor_time`.
    /// Symbols with no such candle get no baseline.
    pub fn prepare<'a, I>(anchor_time: i64, anchored: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Series)>,
    {
        let baselines = anchored
            .into_iter()
            .filter_map(|(symbol, series)| {
                let candle = series.iter().find(|c| c.open_time >= anchor_time)?;
                Some((symbol.to_string(), candle.open))
            })
            .collect();

        Self {
            anchor_time,
            baselines,
        }
    }

    pub fn from_baselines(anchor_time: i64, baselines: HashMap<String, f64>) -> Self {
        Self {
            anchor_time,
            baselines,
        }
    }

    pub fn anchor_time(&self) -> i64 {
        self.anchor_time
    }

    /// Prepared symbols, sorted, for the follow-up fetch.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.baselines.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.baselines.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}

impl BaselineStrategy for PreparedBaselineRanking {
    fn name(&self) -> &'static str {
        "prepared"
    }

    fn baseline(&self, symbol: &str, _window: &Series) -> Option<f64> {
        self.baselines.get(symbol).copied()
    }
}

/// Ranks window changes under `strategy`, annotating each entry with the
/// window's highest high and the drawdown from it.
pub fn rank_window_change(
    strategy: &dyn BaselineStrategy,
    windows: &[(String, Series)],
    direction: SortDirection,
) -> Vec<RankedEntry> {
    let entries = windows
        .iter()
        .filter_map(|(symbol, window)| {
            let close = window.last()?.close;
            let Some(change) = strategy.change(symbol, window) else {
                debug!(%symbol, strategy = strategy.name(), "no usable baseline");
                return None;
            };

            let mut entry = PerSymbolMetrics {
                price: Some(close),
                window_change: Some(change),
                ..PerSymbolMetrics::new(symbol.clone())
            };

            let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
            if let Some(from_high) = ratio(close - high, high) {
                entry = entry.with_aux("high_so_far", high).with_aux("change_from_high", from_high);
            }
            Some(entry)
        })
        .collect();

    let mut order = RankOrder::by(MetricSelector::WindowChange);
    order.direction = direction;
    rank(entries, &order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::tests::oc;
    use crate::ranking::AuxValue;

    fn windows() -> Vec<(String, Series)> {
        vec![
            ("AUSDT".to_string(), Series::new(vec![oc(10, 10.0, 11.0), oc(11, 11.0, 12.0)]).unwrap()),
            ("BUSDT".to_string(), Series::new(vec![oc(10, 4.0, 5.0), oc(11, 5.0, 6.0)]).unwrap()),
        ]
    }

    #[test]
    fn inline_uses_first_candle_of_window() {
        let ranked = rank_window_change(&InlineBaselineRanking, &windows(), SortDirection::Descending);
        assert_eq!(ranked[0].symbol, "BUSDT");
        assert_eq!(ranked[0].metric, 0.5);
        assert_eq!(ranked[1].metric, 0.2);
        assert_eq!(ranked[0].auxiliary.get("change_from_high"), Some(&AuxValue::Float(0.0)));
    }

    #[test]
    fn prepared_uses_anchor_snapshot_and_skips_unprepared() {
        let a_anchor = Series::new(vec![oc(1, 7.0, 8.0), oc(5, 8.0, 9.0)]).unwrap();
        let c_anchor = Series::new(vec![oc(1, 1.0, 1.0)]).unwrap();
        let strategy = PreparedBaselineRanking::prepare(5, [("AUSDT", &a_anchor), ("CUSDT", &c_anchor)]);

        // CUSDT has nothing at or after the anchor.
        assert_eq!(strategy.symbols(), vec!["AUSDT".to_string()]);
        assert!(strategy.contains("AUSDT") && !strategy.contains("CUSDT"));

        let ranked = rank_window_change(&strategy, &windows(), SortDirection::Descending);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "AUSDT");
        assert_eq!(ranked[0].metric, 0.5);
    }

    #[test]
    fn zero_prepared_baseline_is_excluded() {
        let strategy = PreparedBaselineRanking::from_baselines(
            0,
            HashMap::from([("AUSDT".to_string(), 0.0), ("BUSDT".to_string(), 3.0)]),
        );
        let ranked = rank_window_change(&strategy, &windows(), SortDirection::Ascending);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "BUSDT");
        assert_eq!(ranked[0].metric, 1.0);
    }
}
