use crate::domain::instrument::Instrument;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Computed technical indicators for one timeframe window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Indicators {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bollinger_pct_b: f64,
    pub adx: f64,
    pub atr: f64,
    /// Composite 0–100 signal-strength score.
    pub signal_strength: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sentiment {
    /// -1.0 (very bearish) .. 1.0 (very bullish)
    pub score: f64,
    pub sample_size: u32,
}

/// The immutable snapshot consumed by exactly one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFrame {
    pub instrument: Instrument,
    pub timestamp: DateTime<Utc>,
    pub ohlcv_windows: HashMap<Timeframe, Vec<Ohlcv>>,
    pub indicators: HashMap<Timeframe, Indicators>,
    pub sentiment: Option<Sentiment>,
    pub monitoring_context: String,
}

impl MarketFrame {
    pub fn new(instrument: Instrument, timestamp: DateTime<Utc>) -> Self {
        Self {
            instrument,
            timestamp,
            ohlcv_windows: HashMap::new(),
            indicators: HashMap::new(),
            sentiment: None,
            monitoring_context: String::new(),
        }
    }
}
