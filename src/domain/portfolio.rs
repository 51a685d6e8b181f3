use crate::domain::position::Position;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// One point on the equity curve, used by the Risk Gatekeeper's drawdown
/// and VaR checks.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// Current portfolio state, read-only from the Risk Gatekeeper's point of
/// view — it never sizes or mutates positions, only validates against
/// them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: HashMap<String, Position>,
}

impl Portfolio {
    pub fn total_equity(&self, current_prices: &HashMap<String, Decimal>) -> Decimal {
        let mut equity = self.cash;
        for (symbol, position) in &self.positions {
            let price = current_prices
                .get(symbol)
                .copied()
                .unwrap_or(position.entry_price);
            equity += position.unrealized_pnl(price) + position.entry_price * position.size;
        }
        equity
    }

    pub fn position_value(&self, symbol: &str, current_prices: &HashMap<String, Decimal>) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| {
                let price = current_prices.get(symbol).copied().unwrap_or(p.entry_price);
                p.size * price
            })
            .unwrap_or(Decimal::ZERO)
    }
}
