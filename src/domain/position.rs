use crate::domain::instrument::Instrument;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

/// An open broker-side position. `size` is always positive; direction is
/// carried entirely by `side`, so PnL math stays side-aware rather than
/// sign-aware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub instrument: Instrument,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub entry_timestamp: DateTime<Utc>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
}

impl Position {
    /// Unrealized PnL at `current_price`. LONG: `(current - entry) *
    /// size`. SHORT: `(entry - current) * size`.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (current_price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - current_price) * self.size,
        }
    }

    pub fn unrealized_pnl_pct(&self, current_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl(current_price) / (self.entry_price * self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: Side) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            instrument: Instrument::new("BTCUSD", "crypto"),
            side,
            size: dec!(2),
            entry_price: dec!(100),
            entry_timestamp: Utc::now(),
            stop_loss_price: None,
            take_profit_price: None,
            liquidation_price: None,
        }
    }

    #[test]
    fn long_pnl_is_price_minus_entry_times_size() {
        let p = position(Side::Long);
        assert_eq!(p.unrealized_pnl(dec!(110)), dec!(20));
    }

    #[test]
    fn short_pnl_is_entry_minus_price_times_size() {
        let p = position(Side::Short);
        assert_eq!(p.unrealized_pnl(dec!(90)), dec!(20));
        assert_eq!(p.unrealized_pnl(dec!(110)), dec!(-20));
    }
}
