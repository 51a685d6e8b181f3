use crate::domain::instrument::Instrument;
use crate::domain::position::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
    Liquidation,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRegime {
    Trending,
    Ranging,
    Volatile,
    Unknown,
}

/// The sole substrate for cross-run learning. Written exactly once per
/// `decision_id` — see [`crate::application::learning_memory::LearningMemory::record`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub decision_id: Uuid,
    pub instrument: Instrument,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_ts: DateTime<Utc>,
    pub exit_price: Decimal,
    pub exit_ts: DateTime<Utc>,
    pub holding_hours: f64,
    pub realized_pnl: Decimal,
    pub realized_pnl_pct: f64,
    pub ai_provider: Option<String>,
    pub ensemble_providers: Vec<String>,
    pub decision_confidence: f64,
    pub hit_stop_loss: bool,
    pub hit_take_profit: bool,
    pub peak_pnl: Decimal,
    pub max_drawdown: Decimal,
    pub market_regime_at_entry: MarketRegime,
    pub exit_reason: ExitReason,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }
}
