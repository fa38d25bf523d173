pub mod batch;
pub mod candle;
pub mod error;
pub mod extrema;
pub mod leaderboard;
pub mod market_data;
pub mod ranking;
pub mod report;
pub mod resample;
pub mod screens;
pub mod storage_utils;
pub mod streak;
pub mod universe;
pub mod window_change;
