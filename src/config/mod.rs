//! Typed configuration for the core. Concrete env/file parsing is out of
//! scope — callers populate these structs however they like;
//! what's specified here is the recognized keys, their
//! defaults, and `validate()`'s hard-error behavior for out-of-range
//! values.

mod agent_loop_config;
mod circuit_breaker_config;
mod ensemble_config;
mod learning_config;
mod risk_config;
mod trade_monitor_config;

pub use agent_loop_config::AgentLoopConfig;
pub use circuit_breaker_config::CircuitBreakerConfig;
pub use ensemble_config::{EnsembleConfig, ProviderSpec, Strategy};
pub use learning_config::LearningConfig;
pub use risk_config::RiskConfig;
pub use trade_monitor_config::TradeMonitorConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Aggregate configuration for one agent instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent_loop: AgentLoopConfig,
    pub ensemble: EnsembleConfig,
    pub risk: RiskConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub learning: LearningConfig,
    pub trade_monitor: TradeMonitorConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent_loop.validate()?;
        self.ensemble.validate()?;
        self.risk.validate()?;
        self.circuit_breaker.validate()?;
        self.learning.validate()?;
        self.trade_monitor.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_loop: AgentLoopConfig::default(),
            ensemble: EnsembleConfig::default(),
            risk: RiskConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            learning: LearningConfig::default(),
            trade_monitor: TradeMonitorConfig::default(),
        }
    }
}
