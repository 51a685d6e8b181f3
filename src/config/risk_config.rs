use super::ConfigError;

#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    pub max_drawdown_pct: f64,
    pub max_daily_var_pct: f64,
    pub max_position_concentration_pct: f64,
    pub max_correlated_positions: usize,
    pub correlation_cap: f64,
    pub confidence_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 0.05,
            max_daily_var_pct: 0.05,
            max_position_concentration_pct: 0.25,
            max_correlated_positions: 2,
            correlation_cap: 0.7,
            confidence_threshold: 60.0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_drawdown_pct) {
            return Err(ConfigError::Invalid("max_drawdown_pct must be within [0,1]".into()));
        }
        if !(0.0..=1.0).contains(&self.max_position_concentration_pct) {
            return Err(ConfigError::Invalid(
                "max_position_concentration_pct must be within [0,1]".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.correlation_cap) {
            return Err(ConfigError::Invalid("correlation_cap must be within [-1,1]".into()));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(
                "confidence_threshold must be within [0,100]".into(),
            ));
        }
        Ok(())
    }
}
