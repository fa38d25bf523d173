//! Swing-point detection.

use crate::candle::{Candle, Series};
use serde::Serialize;

/// A located extremum, or the `NOT_FOUND` sentinel (`index == -1`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtremumResult {
    pub value: f64,
    pub index: isize,
}

impl ExtremumResult {
    pub const NOT_FOUND: ExtremumResult = ExtremumResult {
        value: 0.0,
        index: -1,
    };

    pub fn is_found(&self) -> bool {
        self.index >= 0
    }

    pub fn position(&self) -> Option<usize> {
        usize::try_from(self.index).ok()
    }
}

/// Most recent candle whose low undercuts the `width` lows before it and is
/// never undercut afterwards. The newest candle is never a candidate.
pub fn find_last_local_low(series: &Series, width: usize) -> ExtremumResult {
    find_last_local(series, width, |c| c.low, |a, b| a < b)
}

/// Mirror of [`find_last_local_low`] on highs.
pub fn find_last_local_high(series: &Series, width: usize) -> ExtremumResult {
    find_last_local(series, width, |c| c.high, |a, b| a > b)
}

/// `beats(a, b)`: `a` is strictly more extreme than `b`.
fn find_last_local(
    series: &Series,
    width: usize,
    price: impl Fn(&Candle) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> ExtremumResult {
    let len = series.len();
    if len < width + 1 || len < 2 {
        return ExtremumResult::NOT_FOUND;
    }

    for i in (width..len - 1).rev() {
        let current = price(&series[i]);

        let clears_lookback = series[i - width..i].iter().all(|c| beats(current, price(c)));
        if !clears_lookback {
            continue;
        }

        let holds_after = series[i + 1..].iter().all(|c| !beats(price(c), current));
        if holds_after {
            return ExtremumResult {
                value: current,
                index: i as isize,
            };
        }
    }

    ExtremumResult::NOT_FOUND
}

/// Lowest low and highest high of a window, first occurrence on ties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowExtremes {
    pub low: f64,
    pub low_index: usize,
    pub high: f64,
    pub high_index: usize,
}

pub fn window_extremes(candles: &[Candle]) -> Option<WindowExtremes> {
    let first = candles.first()?;
    let mut ext = WindowExtremes {
        low: first.low,
        low_index: 0,
        high: first.high,
        high_index: 0,
    };

    for (i, c) in candles.iter().enumerate().skip(1) {
        if c.low < ext.low {
            ext.low = c.low;
            ext.low_index = i;
        }
        if c.high > ext.high {
            ext.high = c.high;
            ext.high_index = i;
        }
    }

    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_lows(lows: &[f64]) -> Series {
        let candles = lows
            .iter()
            .enumerate()
            .map(|(i, &low)| Candle {
                open_time: i as i64 * 60_000,
                open: low + 1.0,
                high: low + 2.0,
                low,
                close: low + 1.0,
                volume: 1.0,
                trade_count: 1,
            })
            .collect();
        Series::new(candles).unwrap()
    }

    #[test]
    fn finds_most_recent_swing_low() {
        let result = find_last_local_low(&with_lows(&[5.0, 3.0, 4.0, 2.0, 6.0, 7.0]), 3);
        assert_eq!(result, ExtremumResult { value: 2.0, index: 3 });
        assert_eq!(result.position(), Some(3));
    }

    #[test]
    fn short_series_is_not_found() {
        for len in 0..4 {
            let lows: Vec<f64> = (0..len).map(|i| 10.0 - i as f64).collect();
            let result = find_last_local_low(&with_lows(&lows), 3);
            assert_eq!(result, ExtremumResult::NOT_FOUND);
            assert!(!result.is_found());
        }
    }

    #[test]
    fn newest_candle_is_never_a_candidate() {
        // Strictly falling lows: only the last candle would qualify.
        let result = find_last_local_low(&with_lows(&[9.0, 8.0, 7.0, 6.0, 5.0]), 2);
        assert!(!result.is_found());
    }

    #[test]
    fn later_undercut_disqualifies_and_ties_prefer_recency() {
        // Index 3 is undercut by index 5; index 5 has a full lookback and nothing after it lower.
        let series = with_lows(&[5.0, 6.0, 7.0, 2.0, 4.0, 1.5, 3.0, 3.0]);
        assert_eq!(find_last_local_low(&series, 2).index, 5);

        // An equal low later on does not disqualify the earlier point.
        let series = with_lows(&[5.0, 6.0, 7.0, 2.0, 4.0, 2.0, 3.0]);
        assert_eq!(find_last_local_low(&series, 3).index, 3);
    }

    #[test]
    fn local_high_mirrors_low() {
        let candles = [1.0, 3.0, 2.0, 8.0, 4.0, 5.0]
            .iter()
            .enumerate()
            .map(|(i, &high)| Candle {
                open_time: i as i64,
                open: high - 1.0,
                high,
                low: high - 2.0,
                close: high - 1.0,
                volume: 1.0,
                trade_count: 1,
            })
            .collect();
        let result = find_last_local_high(&Series::new(candles).unwrap(), 3);
        assert_eq!(result, ExtremumResult { value: 8.0, index: 3 });
    }

    #[test]
    fn window_extremes_keep_first_occurrence() {
        let series = with_lows(&[4.0, 2.0, 6.0, 2.0, 6.0]);
        let ext = window_extremes(&series).unwrap();
        assert_eq!((ext.low, ext.low_index), (2.0, 1));
        assert_eq!((ext.high, ext.high_index), (8.0, 2));
        assert!(window_extremes(&[]).is_none());
    }
}
