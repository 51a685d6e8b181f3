//! Illustrative wiring of the agent core against the in-memory mock
//! adapters. Not a production entry point — there is no real brokerage,
//! data-feed, or LLM connection here, only enough plumbing to exercise
//! one full OODA cycle end to end and print the resulting report.

use agent_core::config::Config;
use agent_core::domain::ports::Clock;
use agent_core::infrastructure::mock::{demo_providers, InMemoryStorageSink, MockExecutionService, MockPerceptionService};
use agent_core::infrastructure::SystemClock;
use agent_core::{AgentLoop, LearningMemory, TradeMonitor};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("starting agent core demo");

    let mut config = Config::default();
    config.agent_loop.watched_instruments = vec!["BTCUSD".into(), "ETHUSD".into()];
    config.agent_loop.analysis_frequency_seconds = 5;
    config.risk.confidence_threshold = 50.0;
    config.validate().expect("default demo config is valid");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let execution: Arc<dyn agent_core::domain::ports::ExecutionPort> =
        Arc::new(MockExecutionService::new(dec!(100_000)));
    let perception: Arc<dyn agent_core::domain::ports::PerceptionPort> =
        Arc::new(MockPerceptionService::new());
    let storage = Arc::new(InMemoryStorageSink::new());

    let (trade_monitor, outcome_rx) = TradeMonitor::new(
        config.trade_monitor,
        execution.clone(),
        clock.clone(),
    );
    let trade_monitor = Arc::new(trade_monitor);

    let learning_memory = Arc::new(
        LearningMemory::bootstrap(config.learning, storage)
            .await
            .expect("bootstrap never fails against an empty in-memory store"),
    );

    let agent = Arc::new(AgentLoop::new(
        config,
        perception,
        demo_providers(),
        execution,
        trade_monitor,
        learning_memory,
        clock,
        outcome_rx,
    ));

    let agent_handle = agent.clone();
    let run_handle = tokio::spawn(async move { agent_handle.run().await });

    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {
            info!("demo window elapsed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    agent.cancel();
    let _ = run_handle.await;

    info!("agent core demo finished");
    Ok(())
}
