//! Trailing runs of same-direction candles.

use crate::candle::Series;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Streak {
    pub length: usize,
    /// Open of the oldest candle in the run.
    pub start_price: f64,
    /// Close of the newest candle in the run.
    pub end_price: f64,
}

impl Streak {
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// `(end - start) / start`; `None` when there is no run or no usable start price.
    pub fn cumulative_return(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        crate::ranking::ratio(self.end_price - self.start_price, self.start_price)
    }
}

/// Counts consecutive up (or down) candles ending at the newest one.
pub fn trailing_streak(series: &Series, direction: Direction) -> Streak {
    let mut streak = Streak::default();

    for candle in series.iter().rev() {
        let continues = match direction {
            Direction::Up => candle.is_up(),
            Direction::Down => candle.is_down(),
        };
        if !continues {
            break;
        }

        if streak.length == 0 {
            streak.end_price = candle.close;
        }
        streak.start_price = candle.open;
        streak.length += 1;
    }

    streak
}

/// Number of trailing candles that closed above the previous close.
pub fn rising_closes(series: &Series) -> usize {
    series
        .windows(2)
        .rev()
        .take_while(|pair| pair[1].close > pair[0].close)
        .count()
}
