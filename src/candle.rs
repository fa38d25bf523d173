//! Candle value type, ordered series and the timeframe tokens the upstream
//! API understands.

use crate::error::SeriesError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

const MINUTE_MS: i64 = 60_000;

/// One OHLCV record for a fixed time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: u64,
}

impl Candle {
    pub fn is_up(&self) -> bool {
        self.close > self.open
    }

    pub fn is_down(&self) -> bool {
        self.close < self.open
    }

    /// `low <= min(open, close) <= max(open, close) <= high`
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }

    /// Builds a candle from one positional kline row:
    /// `[openTime, open, high, low, close, volume, closeTime, quoteVolume, trades, ...]`.
    pub fn from_row(row: &[LenientNumber]) -> Option<Self> {
        let field = |i: usize| row.get(i).and_then(|n| n.0);

        Some(Self {
            open_time: field(0)? as i64,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
            trade_count: field(8).map(|t| t.max(0.0) as u64).unwrap_or(0),
        })
    }
}

/// A number the upstream may send as a JSON number, a numeric string, an
/// empty string or null.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LenientNumber(pub Option<f64>);

struct LenientNumberVisitor;

impl<'de> Visitor<'de> for LenientNumberVisitor {
    type Value = LenientNumber;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(LenientNumber(Some(v)))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(LenientNumber(Some(v as f64)))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(LenientNumber(Some(v as f64)))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(LenientNumber(None))
        } else {
            v.trim().parse::<f64>().map(|n| LenientNumber(Some(n))).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(LenientNumber(None))
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(LenientNumber(None))
    }
}

impl<'de> Deserialize<'de> for LenientNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LenientNumberVisitor)
    }
}

/// Ordered candles for one symbol and one timeframe, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series {
    candles: Vec<Candle>,
}

impl Series {
    /// Validates that open times are strictly increasing.
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for (i, pair) in candles.windows(2).enumerate() {
            if pair[1].open_time <= pair[0].open_time {
                return Err(SeriesError::OutOfOrder {
                    index: i + 1,
                    open_time: pair[1].open_time,
                    previous: pair[0].open_time,
                });
            }
        }
        Ok(Self { candles })
    }

    /// Wraps candles the caller already knows to be ordered.
    pub fn from_unchecked(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    /// Decodes raw upstream rows, dropping rows with missing prices.
    pub fn from_rows(rows: &[Vec<LenientNumber>]) -> Result<Self, SeriesError> {
        Self::new(rows.iter().filter_map(|r| Candle::from_row(r)).collect())
    }

    /// The newest `n` candles (all of them when `n` exceeds the length).
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    pub fn into_inner(self) -> Vec<Candle> {
        self.candles
    }
}

impl Deref for Series {
    type Target = [Candle];

    fn deref(&self) -> &[Candle] {
        &self.candles
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let candles = Vec::<Candle>::deserialize(deserializer)?;
        Series::new(candles).map_err(de::Error::custom)
    }
}

/// Kline bucket widths accepted by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
}

impl Interval {
    pub const ALL: [Interval; 14] = [
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::SixHours,
        Interval::EightHours,
        Interval::TwelveHours,
        Interval::OneDay,
        Interval::ThreeDays,
        Interval::OneWeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
            Interval::ThreeDays => "3d",
            Interval::OneWeek => "1w",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        let minutes = match self {
            Interval::OneMinute => 1,
            Interval::ThreeMinutes => 3,
            Interval::FiveMinutes => 5,
            Interval::FifteenMinutes => 15,
            Interval::ThirtyMinutes => 30,
            Interval::OneHour => 60,
            Interval::TwoHours => 120,
            Interval::FourHours => 240,
            Interval::SixHours => 360,
            Interval::EightHours => 480,
            Interval::TwelveHours => 720,
            Interval::OneDay => 1_440,
            Interval::ThreeDays => 4_320,
            Interval::OneWeek => 10_080,
        };
        minutes * MINUTE_MS
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s.trim())
            .ok_or_else(|| format!("unknown interval: {s}"))
    }
}
