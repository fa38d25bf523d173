//! Cross-symbol top gainers per UTC calendar day.

use crate::candle::Series;
use crate::ranking::ratio;
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyGain {
    pub symbol: String,
    /// `(close - open) / open` of that day's candle.
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyLeaders {
    pub date: NaiveDate,
    pub leaders: Vec<DailyGain>,
}

/// Buckets every candle by the UTC date it opens on and keeps the `top_n`
/// best gains of each day. When `benchmark` traded that day but did not make
/// the cut, it is appended after the leaders. Days come back newest first.
pub fn daily_top_gainers(
    series_by_symbol: &[(String, Series)],
    top_n: usize,
    benchmark: Option<&str>,
) -> Vec<DailyLeaders> {
    let mut by_date: BTreeMap<NaiveDate, Vec<DailyGain>> = BTreeMap::new();

    for (symbol, series) in series_by_symbol {
        for candle in series.iter() {
            let Some(date) = DateTime::from_timestamp_millis(candle.open_time).map(|dt| dt.date_naive()) else {
                continue;
            };
            let Some(gain) = ratio(candle.close - candle.open, candle.open) else {
                continue;
            };
            by_date.entry(date).or_default().push(DailyGain {
                symbol: symbol.clone(),
                gain,
            });
        }
    }

    by_date
        .into_iter()
        .rev()
        .map(|(date, mut gains)| {
            gains.sort_by(|a, b| b.gain.total_cmp(&a.gain));

            let bench = benchmark.and_then(|b| gains.iter().find(|g| g.symbol == b).cloned());
            gains.truncate(top_n);

            if let Some(bench) = bench {
                if !gains.iter().any(|g| g.symbol == bench.symbol) {
                    gains.push(bench);
                }
            }

            DailyLeaders { date, leaders: gains }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::tests::oc;

    const DAY: i64 = 86_400_000;
    // 2024-03-01T00:00:00Z
    const MARCH_1: i64 = 1_709_251_200_000;

    fn daily(closes: &[(f64, f64)]) -> Series {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &(open, close))| oc(MARCH_1 + i as i64 * DAY, open, close))
            .collect();
        Series::new(candles).unwrap()
    }

    fn names(day: &DailyLeaders) -> Vec<&str> {
        day.leaders.iter().map(|g| g.symbol.as_str()).collect()
    }

    #[test]
    fn keeps_top_gainers_per_day_and_appends_benchmark() {
        let data = vec![
            ("BTCUSDT".to_string(), daily(&[(100.0, 101.0), (100.0, 150.0)])),
            ("AUSDT".to_string(), daily(&[(10.0, 12.0), (10.0, 11.0)])),
            ("BUSDT".to_string(), daily(&[(10.0, 15.0), (10.0, 9.0)])),
            ("CUSDT".to_string(), daily(&[(0.0, 1.0), (10.0, 10.5)])),
        ];

        let days = daily_top_gainers(&data, 2, Some("BTCUSDT"));
        assert_eq!(days.len(), 2);

        // Newest day first; BTC leads and is not duplicated.
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(names(&days[0]), ["BTCUSDT", "AUSDT"]);

        // CUSDT has a zero open on day one and is left out; BTC trails the top two.
        assert_eq!(days[1].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(names(&days[1]), ["BUSDT", "AUSDT", "BTCUSDT"]);
        assert_eq!(days[1].leaders[0].gain, 0.5);
    }

    #[test]
    fn equal_gains_keep_input_order() {
        let data = vec![
            ("XUSDT".to_string(), daily(&[(1.0, 2.0)])),
            ("YUSDT".to_string(), daily(&[(2.0, 4.0)])),
        ];
        let days = daily_top_gainers(&data, 3, None);
        assert_eq!(names(&days[0]), ["XUSDT", "YUSDT"]);
    }

    #[test]
    fn leaders_serialize_with_iso_dates() {
        let data = vec![("XUSDT".to_string(), daily(&[(1.0, 2.0)]))];
        let json = serde_json::to_value(daily_top_gainers(&data, 1, None)).unwrap();

        assert_eq!(json[0]["date"], "2024-03-01");
        assert_eq!(json[0]["leaders"][0]["symbol"], "XUSDT");
        assert_eq!(json[0]["leaders"][0]["gain"], 1.0);
    }
}
