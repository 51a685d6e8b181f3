use agent_core::config::Config;
use agent_core::domain::decision::{Action, ProviderDecision};
use agent_core::domain::errors::CoreError;
use agent_core::domain::instrument::Instrument;
use agent_core::domain::market::MarketFrame;
use agent_core::domain::ports::{Clock, PerceptionPort, ReasoningPort};
use agent_core::domain::position::{Position, Side};
use agent_core::infrastructure::mock::{InMemoryStorageSink, MockExecutionService};
use agent_core::infrastructure::SystemClock;
use agent_core::{AgentLoop, LearningMemory, TradeMonitor};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct EmptyPerception;

#[async_trait]
impl PerceptionPort for EmptyPerception {
    async fn fetch_frame(
        &self,
        instrument: &Instrument,
        _timeframes: &[agent_core::domain::market::Timeframe],
    ) -> Result<MarketFrame, CoreError> {
        Ok(MarketFrame::new(instrument.clone(), Utc::now()))
    }
}

struct HoldProvider;

#[async_trait]
impl ReasoningPort for HoldProvider {
    async fn query(&self, _prompt: &str) -> Result<ProviderDecision, CoreError> {
        Ok(ProviderDecision {
            provider_id: "hold-only".into(),
            action: Action::Hold,
            confidence: 60.0,
            reasoning: "no-op".into(),
            suggested_amount: None,
            latency_ms: 1,
        })
    }
    fn id(&self) -> &str {
        "hold-only"
    }
    fn is_local(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn broker_open_positions_are_recovered_and_tracked_on_startup() {
    let mut config = Config::default();
    config.agent_loop.watched_instruments = vec!["BTCUSD".into()];
    config.agent_loop.analysis_frequency_seconds = 3600;
    config.risk.confidence_threshold = 90.0; // hold never trades, so risk path is irrelevant here

    let execution = Arc::new(MockExecutionService::new(dec!(50_000)));
    execution
        .seed_position(Position {
            position_id: Uuid::new_v4(),
            instrument: Instrument::new("BTC/USD", "crypto"),
            side: Side::Long,
            size: dec!(1),
            entry_price: dec!(60000),
            entry_timestamp: Utc::now(),
            stop_loss_price: None,
            take_profit_price: None,
            liquidation_price: None,
        })
        .await;
    execution
        .seed_position(Position {
            position_id: Uuid::new_v4(),
            instrument: Instrument::new("ETH/USD", "crypto"),
            side: Side::Short,
            size: dec!(2),
            entry_price: dec!(3200),
            entry_timestamp: Utc::now(),
            stop_loss_price: None,
            take_profit_price: None,
            liquidation_price: None,
        })
        .await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let execution_port: Arc<dyn agent_core::domain::ports::ExecutionPort> = execution.clone();
    let (trade_monitor, outcome_rx) =
        TradeMonitor::new(config.trade_monitor, execution_port.clone(), clock.clone());
    let trade_monitor = Arc::new(trade_monitor);

    let storage = Arc::new(InMemoryStorageSink::new());
    let learning_memory = Arc::new(
        LearningMemory::bootstrap(config.learning, storage)
            .await
            .unwrap(),
    );

    let providers: Vec<Arc<dyn ReasoningPort>> = vec![Arc::new(HoldProvider)];

    let agent = Arc::new(AgentLoop::new(
        config,
        Arc::new(EmptyPerception),
        providers,
        execution_port,
        trade_monitor.clone(),
        learning_memory,
        clock,
        outcome_rx,
    ));

    let agent_handle = agent.clone();
    let run_handle = tokio::spawn(async move { agent_handle.run().await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(trade_monitor.tracked_count().await, 2);

    agent.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), run_handle).await;
}
