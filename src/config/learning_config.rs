use super::ConfigError;

#[derive(Debug, Clone, Copy)]
pub struct LearningConfig {
    pub max_memory_size: usize,
    pub context_window_trades: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_memory_size: 1000,
            context_window_trades: 20,
        }
    }
}

impl LearningConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_memory_size == 0 {
            return Err(ConfigError::Invalid("max_memory_size must be > 0".into()));
        }
        Ok(())
    }
}
