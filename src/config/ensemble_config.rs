use super::ConfigError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Weighted,
    Majority,
    Stacking,
}

#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub id: String,
    pub weight: f64,
    pub local: bool,
}

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub providers: Vec<ProviderSpec>,
    pub strategy: Strategy,
    pub min_local_providers: usize,
    pub per_provider_timeout: Duration,
    pub conservative_hold_confidence: f64,
    pub fallback_sentinels: Vec<String>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            strategy: Strategy::Weighted,
            min_local_providers: 0,
            per_provider_timeout: Duration::from_secs(30),
            conservative_hold_confidence: 50.0,
            fallback_sentinels: vec!["I cannot provide".to_string(), "as an AI".to_string()],
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for p in &self.providers {
            if p.weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "provider {} has negative weight",
                    p.id
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.conservative_hold_confidence) {
            return Err(ConfigError::Invalid(
                "conservative_hold_confidence must be within [0,100]".into(),
            ));
        }
        Ok(())
    }
}
