use agent_core::config::{EnsembleConfig, ProviderSpec, Strategy};
use agent_core::domain::decision::{Action, ProviderDecision};
use agent_core::domain::errors::CoreError;
use agent_core::domain::ports::ReasoningPort;
use agent_core::EnsembleAggregator;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

struct RespondingProvider {
    id: &'static str,
    action: Action,
    confidence: f64,
}

#[async_trait]
impl ReasoningPort for RespondingProvider {
    async fn query(&self, _prompt: &str) -> Result<ProviderDecision, CoreError> {
        Ok(ProviderDecision {
            provider_id: self.id.to_string(),
            action: self.action,
            confidence: self.confidence,
            reasoning: "test vote".into(),
            suggested_amount: None,
            latency_ms: 1,
        })
    }
    fn id(&self) -> &str {
        self.id
    }
    fn is_local(&self) -> bool {
        true
    }
}

struct TimingOutProvider {
    id: &'static str,
}

#[async_trait]
impl ReasoningPort for TimingOutProvider {
    async fn query(&self, _prompt: &str) -> Result<ProviderDecision, CoreError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("query should have been timed out before this resolves");
    }
    fn id(&self) -> &str {
        self.id
    }
    fn is_local(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn four_equal_providers_one_timeout_renormalizes_and_buys() {
    let config = EnsembleConfig {
        providers: vec![
            ProviderSpec { id: "P1".into(), weight: 0.25, local: true },
            ProviderSpec { id: "P2".into(), weight: 0.25, local: true },
            ProviderSpec { id: "P3".into(), weight: 0.25, local: true },
            ProviderSpec { id: "P4".into(), weight: 0.25, local: true },
        ],
        strategy: Strategy::Weighted,
        min_local_providers: 0,
        per_provider_timeout: Duration::from_millis(50),
        conservative_hold_confidence: 50.0,
        fallback_sentinels: vec![],
    };
    let aggregator = EnsembleAggregator::new(config);

    let providers: Vec<Arc<dyn ReasoningPort>> = vec![
        Arc::new(RespondingProvider { id: "P1", action: Action::Buy, confidence: 80.0 }),
        Arc::new(TimingOutProvider { id: "P2" }),
        Arc::new(RespondingProvider { id: "P3", action: Action::Buy, confidence: 70.0 }),
        Arc::new(RespondingProvider { id: "P4", action: Action::Hold, confidence: 60.0 }),
    ];

    let decision = aggregator.aggregate("evaluate BTCUSD", &providers).await;

    assert_eq!(decision.action, Action::Buy);
    assert!(decision.metadata.providers_succeeded.contains(&"P1".to_string()));
    assert!(decision.metadata.providers_succeeded.contains(&"P3".to_string()));
    assert!(decision.metadata.providers_succeeded.contains(&"P4".to_string()));
    assert_eq!(decision.metadata.providers_failed.len(), 1);
    assert_eq!(decision.metadata.providers_failed[0].provider_id, "P2");

    let renorm = &decision.metadata.renormalized_weights;
    for (provider, weight) in renorm {
        assert!(
            (weight - 1.0 / 3.0).abs() < 1e-6,
            "expected {provider} renormalized to 1/3, got {weight}"
        );
    }

    // raw confidence = mean(80, 70) over the winning BUY voters = 75,
    // calibrated by 0.7 + 0.3 * (3/4) = 0.925 -> 69.375, rounds to 69 or 70
    // depending on rounding policy; assert the calibration shrank it below raw.
    assert!(decision.confidence < 75.0);
    assert!(decision.confidence > 60.0);
}
