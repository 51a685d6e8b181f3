use super::ConfigError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub analysis_frequency_seconds: u64,
    pub watched_instruments: Vec<String>,
    pub max_decision_retries: u32,
    pub decision_throttle_seconds: u64,
    pub position_recovery_attempts: u32,
    pub position_recovery_initial_backoff: Duration,
    pub kill_switch_loss: Option<rust_decimal::Decimal>,
    pub kill_switch_gain: Option<rust_decimal::Decimal>,
    pub instrument_failure_skip_threshold: u32,
    pub risk_fraction: f64,
    pub stop_loss_fraction: f64,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            analysis_frequency_seconds: 300,
            watched_instruments: Vec::new(),
            max_decision_retries: 3,
            decision_throttle_seconds: 60,
            position_recovery_attempts: 3,
            position_recovery_initial_backoff: Duration::from_secs(1),
            kill_switch_loss: None,
            kill_switch_gain: None,
            instrument_failure_skip_threshold: 5,
            risk_fraction: 0.01,
            stop_loss_fraction: 0.02,
        }
    }
}

impl AgentLoopConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis_frequency_seconds == 0 {
            return Err(ConfigError::Invalid(
                "analysis_frequency_seconds must be > 0".into(),
            ));
        }
        if self.max_decision_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_decision_retries must be > 0".into(),
            ));
        }
        Ok(())
    }
}
