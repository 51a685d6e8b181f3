use agent_core::config::{EnsembleConfig, ProviderSpec, Strategy};
use agent_core::domain::decision::{Action, ProviderDecision};
use agent_core::domain::errors::CoreError;
use agent_core::domain::ports::ReasoningPort;
use agent_core::EnsembleAggregator;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

struct AlwaysFailsProvider {
    id: &'static str,
}

#[async_trait]
impl ReasoningPort for AlwaysFailsProvider {
    async fn query(&self, _prompt: &str) -> Result<ProviderDecision, CoreError> {
        Err(CoreError::TransientExternal("upstream unreachable".into()))
    }
    fn id(&self) -> &str {
        self.id
    }
    fn is_local(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn every_provider_failing_falls_back_to_conservative_hold() {
    let config = EnsembleConfig {
        providers: vec![
            ProviderSpec { id: "P1".into(), weight: 0.5, local: true },
            ProviderSpec { id: "P2".into(), weight: 0.5, local: true },
        ],
        strategy: Strategy::Weighted,
        min_local_providers: 0,
        per_provider_timeout: Duration::from_millis(50),
        conservative_hold_confidence: 42.0,
        fallback_sentinels: vec![],
    };
    let aggregator = EnsembleAggregator::new(config);

    let providers: Vec<Arc<dyn ReasoningPort>> = vec![
        Arc::new(AlwaysFailsProvider { id: "P1" }),
        Arc::new(AlwaysFailsProvider { id: "P2" }),
    ];

    let decision = aggregator.aggregate("evaluate BTCUSD", &providers).await;

    assert_eq!(decision.action, Action::Hold);
    assert_eq!(decision.confidence, 42.0);
    assert!(decision.metadata.all_providers_failed);
    assert!(decision.metadata.providers_succeeded.is_empty());
    assert_eq!(decision.metadata.providers_failed.len(), 2);
}
