//! Stateful coordination built on top of the domain types and external
//! ports. Each module here corresponds to one numbered component in
//! the application layer.

pub mod agent_loop;
pub mod circuit_breaker;
pub mod ensemble_aggregator;
pub mod learning_memory;
pub mod risk_gatekeeper;
pub mod trade_monitor;

pub use agent_loop::{AgentLoop, CycleReport};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use ensemble_aggregator::EnsembleAggregator;
pub use learning_memory::LearningMemory;
pub use risk_gatekeeper::{Mode, RiskContext, RiskGatekeeper};
pub use trade_monitor::TradeMonitor;
