//! In-memory port adapters for tests and local demos. None of these
//! talk to a real broker, feed, or provider — they exist so the rest of
//! the crate can be exercised end-to-end without network access.

use crate::domain::decision::ProviderDecision;
use crate::domain::errors::CoreError;
use crate::domain::instrument::Instrument;
use crate::domain::market::{MarketFrame, Timeframe};
use crate::domain::outcome::TradeOutcome;
use crate::domain::ports::{AccountInfo, Ack, ExecutionPort, OrderRequest, PerceptionPort, ReasoningPort};
use crate::domain::position::{Position, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Fills every order immediately at the requested reference price and
/// tracks the resulting position in memory. `set_balance` lets a test
/// or demo script drive the account balance directly rather than
/// reconstructing it from fills.
pub struct MockExecutionService {
    positions: RwLock<HashMap<Uuid, Position>>,
    balance: RwLock<Decimal>,
}

impl MockExecutionService {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            balance: RwLock::new(starting_balance),
        }
    }

    pub async fn set_balance(&self, balance: Decimal) {
        *self.balance.write().await = balance;
    }

    pub async fn seed_position(&self, position: Position) {
        self.positions.write().await.insert(position.position_id, position);
    }
}

#[async_trait]
impl ExecutionPort for MockExecutionService {
    async fn submit(&self, order: OrderRequest) -> Result<Ack, CoreError> {
        let side = match order.side {
            crate::domain::decision::Action::Buy => Side::Long,
            crate::domain::decision::Action::Sell => Side::Short,
            crate::domain::decision::Action::Hold => {
                return Err(CoreError::PolicyRejection {
                    reason: "cannot submit an order for a Hold action".into(),
                });
            }
        };

        let position = Position {
            position_id: Uuid::new_v4(),
            instrument: order.instrument.clone(),
            side,
            size: order.quantity,
            entry_price: order.reference_price,
            entry_timestamp: chrono::Utc::now(),
            stop_loss_price: None,
            take_profit_price: None,
            liquidation_price: None,
        };
        let position_id = position.position_id;
        self.positions.write().await.insert(position_id, position);

        info!(instrument = %order.instrument, quantity = %order.quantity, "mock execution filled order");

        Ok(Ack {
            broker_order_id: position_id.to_string(),
            accepted_at: chrono::Utc::now(),
        })
    }

    async fn list_positions(&self) -> Result<Vec<Position>, CoreError> {
        Ok(self.positions.read().await.values().cloned().collect())
    }

    async fn account_info(&self) -> Result<AccountInfo, CoreError> {
        Ok(AccountInfo {
            balance: *self.balance.read().await,
            max_leverage: 1.0,
            maintenance_margin: Decimal::ZERO,
        })
    }
}

/// Returns a flat, static frame for whatever instrument is requested.
/// A test that needs a specific candle sequence should construct a
/// [`MarketFrame`] directly rather than extending this adapter.
pub struct MockPerceptionService {
    frames: RwLock<HashMap<String, MarketFrame>>,
}

impl MockPerceptionService {
    pub fn new() -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_frame(&self, instrument: &Instrument, frame: MarketFrame) {
        self.frames
            .write()
            .await
            .insert(instrument.symbol().to_string(), frame);
    }
}

impl Default for MockPerceptionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PerceptionPort for MockPerceptionService {
    async fn fetch_frame(
        &self,
        instrument: &Instrument,
        _timeframes: &[Timeframe],
    ) -> Result<MarketFrame, CoreError> {
        if let Some(frame) = self.frames.read().await.get(instrument.symbol()) {
            return Ok(frame.clone());
        }
        Ok(MarketFrame::new(instrument.clone(), chrono::Utc::now()))
    }
}

/// A reasoning provider whose response is fixed at construction time,
/// optionally with an injected latency or failure.
pub struct MockReasoningProvider {
    id: String,
    is_local: bool,
    response: RwLock<Result<ProviderDecision, CoreError>>,
}

impl MockReasoningProvider {
    pub fn new(id: impl Into<String>, is_local: bool, response: ProviderDecision) -> Self {
        Self {
            id: id.into(),
            is_local,
            response: RwLock::new(Ok(response)),
        }
    }

    pub async fn set_response(&self, response: Result<ProviderDecision, CoreError>) {
        *self.response.write().await = response;
    }
}

#[async_trait]
impl ReasoningPort for MockReasoningProvider {
    async fn query(&self, _prompt: &str) -> Result<ProviderDecision, CoreError> {
        self.response.read().await.clone()
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_local(&self) -> bool {
        self.is_local
    }
}

/// Non-persistent [`StorageSink`](crate::domain::ports::StorageSink),
/// suitable for tests and the demo binary. A restart loses everything —
/// there is no file or database behind it.
#[derive(Default)]
pub struct InMemoryStorageSink {
    outcomes: RwLock<Vec<TradeOutcome>>,
}

impl InMemoryStorageSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::domain::ports::StorageSink for InMemoryStorageSink {
    async fn append(&self, outcome: &TradeOutcome) -> Result<(), CoreError> {
        self.outcomes.write().await.push(outcome.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TradeOutcome>, CoreError> {
        Ok(self.outcomes.read().await.clone())
    }

    /// No-op: there is no on-disk staging file to rename. `append`
    /// already publishes under the same lock `list` reads through, so
    /// there is no partial-write window for a real adapter's rename to
    /// close here.
    async fn atomic_rename(&self, _tmp: &str, _dst: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Builds a ready-to-wire set of mock adapters sized for a demo run:
/// one execution service, one perception service, and a handful of
/// reasoning providers with distinct ids and weights.
pub fn demo_providers() -> Vec<Arc<dyn ReasoningPort>> {
    vec![
        Arc::new(MockReasoningProvider::new(
            "local-momentum",
            true,
            ProviderDecision {
                provider_id: "local-momentum".into(),
                action: crate::domain::decision::Action::Hold,
                confidence: 55.0,
                reasoning: "insufficient trend confirmation".into(),
                suggested_amount: None,
                latency_ms: 5,
            },
        )),
        Arc::new(MockReasoningProvider::new(
            "remote-llm",
            false,
            ProviderDecision {
                provider_id: "remote-llm".into(),
                action: crate::domain::decision::Action::Hold,
                confidence: 60.0,
                reasoning: "mixed signals, no clear edge".into(),
                suggested_amount: None,
                latency_ms: 120,
            },
        )),
    ]
}
