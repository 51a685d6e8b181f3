use super::ConfigError;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TradeMonitorConfig {
    pub max_concurrent_trackers: usize,
    pub detection_interval: Duration,
    pub poll_interval: Duration,
    pub pending_high_water_mark: usize,
    pub shutdown_grace: Duration,
}

impl Default for TradeMonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_trackers: 2,
            detection_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            pending_high_water_mark: 10,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl TradeMonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_trackers == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_trackers must be > 0".into(),
            ));
        }
        if self.pending_high_water_mark == 0 {
            return Err(ConfigError::Invalid(
                "pending_high_water_mark must be > 0".into(),
            ));
        }
        Ok(())
    }
}
