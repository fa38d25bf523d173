use crate::leaderboard::DailyLeaders;
use crate::ranking::{AuxValue, RankedEntry};
use crate::screens::{BoundaryViews, ScreenOutput, ScreenResult};
use chrono::DateTime;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};
use std::collections::BTreeMap;

fn visibility_ratio(current: f64, top: f64) -> f64 {
    let top = if top == 0.0 { 1.0 } else { top };
    (0.4 + 0.6 * (current / top).abs()).clamp(0.4, 1.0)
}

pub fn format_timestamp(ts_ms: i64) -> String {
    match DateTime::from_timestamp_millis(ts_ms) {
        Some(dt) => dt.format("%d-%m-%Y %H:%M:%S").to_string(),
        None => "Unknown Time".to_string(),
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    table
}

fn format_aux(aux: &BTreeMap<String, AuxValue>) -> String {
    aux.iter()
        .map(|(k, v)| match v {
            AuxValue::Int(i) => format!("{k}={i}"),
            AuxValue::Float(f) => format!("{k}={f:.4}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn shade(value: u8, ratio: f64) -> u8 {
    (value as f64 * ratio) as u8
}

/// Top `limit` ranked entries, brightest first.
pub fn ranked_table(entries: &[RankedEntry], limit: usize) -> Table {
    let mut table = new_table(&["Rank", "Asset", "Metric", "Details"]);
    let top = entries.first().map(|e| e.metric).unwrap_or(1.0);

    for (rank, entry) in entries.iter().take(limit).enumerate() {
        let ratio = visibility_ratio(entry.metric, top);
        let (r, g) = if entry.metric < 0.0 {
            (shade(255, ratio), 0)
        } else {
            (0, shade(255, ratio))
        };

        table.add_row(vec![
            Cell::new(rank + 1).fg(Color::DarkGrey),
            Cell::new(&entry.symbol).fg(Color::Rgb {
                r: 0,
                g: shade(255, ratio),
                b: shade(255, ratio),
            }),
            Cell::new(format!("{:.4}", entry.metric))
                .fg(Color::Rgb { r, g, b: 0 })
                .set_alignment(CellAlignment::Right),
            Cell::new(format_aux(&entry.auxiliary)).fg(Color::Rgb {
                r: shade(150, ratio),
                g: shade(150, ratio),
                b: shade(150, ratio),
            }),
        ]);
    }
    table
}

pub fn daily_table(days: &[DailyLeaders]) -> Table {
    let mut table = new_table(&["Date", "Rank", "Asset", "Gain (%)"]);
    for day in days {
        for (rank, leader) in day.leaders.iter().enumerate() {
            let date = if rank == 0 { day.date.to_string() } else { String::new() };
            table.add_row(vec![
                Cell::new(date).fg(Color::DarkGrey),
                Cell::new(rank + 1),
                Cell::new(&leader.symbol).fg(Color::Cyan),
                Cell::new(format!("{:.2}%", leader.gain * 100.0)).set_alignment(CellAlignment::Right),
            ]);
        }
    }
    table
}

pub fn views_table(views: &BoundaryViews) -> Table {
    let mut table = new_table(&["View", "Open Time (UTC)", "Open", "High", "Low", "Close", "Trades"]);
    let rows = [
        ("boundary first", &views.boundary_first),
        ("boundary pending", &views.boundary_pending),
    ];
    for (name, series) in rows {
        for candle in series.iter() {
            table.add_row(vec![
                Cell::new(name).fg(Color::DarkGrey),
                Cell::new(format_timestamp(candle.open_time)),
                Cell::new(candle.open),
                Cell::new(candle.high),
                Cell::new(candle.low),
                Cell::new(candle.close),
                Cell::new(candle.trade_count).set_alignment(CellAlignment::Right),
            ]);
        }
    }
    table
}

/// Renders a screen run as one or more tables under a timestamped title.
pub fn render(output: &ScreenOutput, limit: usize) -> String {
    let title = format!(
        "{} (Data taken at {} UTC)",
        output.title,
        format_timestamp(output.last_updated_timestamp)
    );

    let body = match &output.result {
        ScreenResult::Ranked(entries) if entries.is_empty() => "No data found.".to_string(),
        ScreenResult::Ranked(entries) => ranked_table(entries, limit).to_string(),
        ScreenResult::Split { up, down } => format!(
            "Recovering from lows\n{}\nDeclining from highs\n{}",
            ranked_table(up, limit),
            ranked_table(down, limit)
        ),
        ScreenResult::Daily(days) => daily_table(days).to_string(),
        ScreenResult::Views(views) => views_table(views).to_string(),
    };

    let mut text = format!("\n{title}\n{body}\n");
    if !output.skipped.is_empty() {
        let retryable = output.skipped.iter().filter(|s| s.retryable).count();
        text.push_str(&format!(
            "Skipped {} symbols ({} retryable)\n",
            output.skipped.len(),
            retryable
        ));
    }
    if output.cancelled {
        text.push_str("Run cancelled before every chunk completed\n");
    }
    text
}
