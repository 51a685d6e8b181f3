//! Core control loop for an autonomous, multi-provider trading agent:
//! ensemble decision aggregation, pre-execution risk gatekeeping, a
//! circuit breaker around the execution back-end, open-position
//! monitoring, and cross-run learning memory, bound together by an
//! OODA-style agent loop. Concrete brokerage, market-data, and LLM
//! adapters are out of scope — this crate owns the decision core and
//! the port contracts that adapters implement.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::{
    AgentLoop, CircuitBreaker, CircuitBreakerError, CircuitState, CycleReport, EnsembleAggregator,
    LearningMemory, Mode, RiskContext, RiskGatekeeper, TradeMonitor,
};
pub use config::Config;
