//! Merges fine-grained candles into coarser ones (e.g. 5m → 10m).
//!
//! Grouping always starts from the newest candle and walks back in time, so
//! the most recent coarse candle is never the one that gets truncated. A
//! leftover group at the oldest end that is too small is dropped rather than
//! merged into a misleading aggregate.

use crate::candle::{Candle, Series};

/// How the newest coarse candle lines up with the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Plain groups of `group_size` counted back from the newest candle.
    #[default]
    Unaligned,
    /// Groups open on multiples of the coarse granularity; a newest candle
    /// sitting exactly on a boundary is emitted as its own unit.
    BoundaryFirst,
    /// Boundaries shifted by one fine interval; a newest candle off the
    /// boundary starts a new accumulating group.
    BoundaryPending,
}

impl Alignment {
    pub fn from_flag(align_to_boundary: bool) -> Self {
        if align_to_boundary {
            Alignment::BoundaryFirst
        } else {
            Alignment::Unaligned
        }
    }
}

/// Aggregates `group_size` consecutive candles of `fine` into one candle.
pub fn aggregate(fine: &Series, group_size: usize, alignment: Alignment) -> Series {
    if fine.len() < 2 || group_size == 0 {
        return Series::default();
    }

    let newest = fine[fine.len() - 1].open_time;
    let fine_ms = newest.saturating_sub(fine[fine.len() - 2].open_time);
    if fine_ms <= 0 {
        return Series::default();
    }
    let Some(coarse_ms) = i64::try_from(group_size).ok().and_then(|k| fine_ms.checked_mul(k)) else {
        return Series::default();
    };

    let leading = match alignment {
        Alignment::Unaligned => group_size,
        Alignment::BoundaryFirst => candles_since_boundary(newest, fine_ms, coarse_ms, group_size),
        Alignment::BoundaryPending => {
            candles_since_boundary(newest - fine_ms, fine_ms, coarse_ms, group_size)
        }
    }
    .min(fine.len());

    let mut coarse = Vec::with_capacity(fine.len() / group_size + 1);
    let mut end = fine.len();

    // Only the aligned modes emit a newest partial group.
    if alignment != Alignment::Unaligned && leading < group_size {
        coarse.push(merge(&fine[end - leading..end]));
        end -= leading;
    }

    while end >= group_size {
        coarse.push(merge(&fine[end - group_size..end]));
        end -= group_size;
    }

    coarse.reverse();
    Series::from_unchecked(coarse)
}

/// Number of fine candles (including the one at `open_time`) that fall in
/// the coarse bucket containing `open_time`.
fn candles_since_boundary(open_time: i64, fine_ms: i64, coarse_ms: i64, group_size: usize) -> usize {
    let phase = open_time.rem_euclid(coarse_ms);
    ((phase / fine_ms) as usize + 1).clamp(1, group_size)
}

/// Merges a non-empty, chronologically ordered group.
fn merge(group: &[Candle]) -> Candle {
    let first = group[0];
    let last = group[group.len() - 1];

    group.iter().skip(1).fold(
        Candle {
            close: last.close,
            ..first
        },
        |acc, c| Candle {
            high: acc.high.max(c.high),
            low: acc.low.min(c.low),
            volume: acc.volume + c.volume,
            trade_count: acc.trade_count + c.trade_count,
            ..acc
        },
    )
}
