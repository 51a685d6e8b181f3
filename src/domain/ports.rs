use crate::domain::decision::ProviderDecision;
use crate::domain::errors::CoreError;
use crate::domain::instrument::Instrument;
use crate::domain::market::{MarketFrame, Timeframe};
use crate::domain::outcome::TradeOutcome;
use crate::domain::position::Position;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// The pending order the Agent Loop hands to `ExecutionPort::submit`.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub instrument: Instrument,
    pub side: crate::domain::decision::Action,
    pub quantity: Decimal,
    pub reference_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct Ack {
    pub broker_order_id: String,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct AccountInfo {
    pub balance: Decimal,
    pub max_leverage: f64,
    pub maintenance_margin: Decimal,
}

/// Fetches a market snapshot for one instrument. Concrete data-feed
/// adapters (exchange REST/WS clients, historical replay readers) are
/// out of scope for the core — only this contract is specified.
#[async_trait]
pub trait PerceptionPort: Send + Sync {
    async fn fetch_frame(
        &self,
        instrument: &Instrument,
        timeframes: &[Timeframe],
    ) -> Result<MarketFrame, CoreError>;
}

/// One reasoning provider. `query` may fail with any `CoreError`
/// variant; the Ensemble Aggregator treats exception, timeout, and
/// invalid response identically as a provider failure.
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    async fn query(&self, prompt: &str) -> Result<ProviderDecision, CoreError>;
    fn id(&self) -> &str;
    fn is_local(&self) -> bool;
}

/// Brokerage execution surface. `list_positions` always returns a flat
/// sequence — callers never branch on whether the underlying broker
/// represents open positions as a dict or a list.
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn submit(&self, order: OrderRequest) -> Result<Ack, CoreError>;
    async fn list_positions(&self) -> Result<Vec<Position>, CoreError>;
    async fn account_info(&self) -> Result<AccountInfo, CoreError>;
}

/// Append-only outcome storage. `atomic_rename` is required: partial
/// writes must never be observable by `list`.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn append(&self, outcome: &TradeOutcome) -> Result<(), CoreError>;
    async fn list(&self) -> Result<Vec<TradeOutcome>, CoreError>;

    /// Publish a staged write at `tmp` to `dst` atomically: once this
    /// returns `Ok`, `list` must observe the write in full or not at
    /// all, never partially.
    async fn atomic_rename(&self, tmp: &str, dst: &str) -> Result<(), CoreError>;
}

/// Injectable time source so replay can drive the core from historical
/// data instead of the wall clock.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: std::time::Duration);
    fn next_boundary(&self, period: std::time::Duration) -> DateTime<Utc>;
}
