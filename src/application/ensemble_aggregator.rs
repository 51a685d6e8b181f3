use crate::config::{EnsembleConfig, ProviderSpec, Strategy};
use crate::domain::decision::{
    Action, EnsembleDecision, EnsembleMetadata, FailureReason, FallbackTier, ProviderDecision,
    ProviderFailure,
};
use crate::domain::errors::CoreError;
use crate::domain::ports::ReasoningPort;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parallel fan-out to every configured reasoning provider, with dynamic
/// weight renormalization, progressive fallback tiers, quorum policy and
/// confidence calibration.
pub struct EnsembleAggregator {
    config: EnsembleConfig,
}

struct Collected {
    provider_id: String,
    is_local: bool,
    weight: f64,
    decision: Result<ProviderDecision, ProviderFailure>,
}

impl EnsembleAggregator {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Query every provider concurrently (bounded by `providers.len()`,
    /// no shared work queue), then aggregate deterministically.
    pub async fn aggregate(
        &self,
        prompt: &str,
        providers: &[Arc<dyn ReasoningPort>],
    ) -> EnsembleDecision {
        let weight_by_id: std::collections::HashMap<&str, &ProviderSpec> = self
            .config
            .providers
            .iter()
            .map(|p| (p.id.as_str(), p))
            .collect();

        let futures = providers.iter().map(|provider| {
            let prompt = prompt.to_string();
            async move {
                let spec = weight_by_id.get(provider.id());
                let weight = spec.map(|s| s.weight).unwrap_or(0.0);
                let is_local = provider.is_local();
                let outcome = tokio::time::timeout(
                    self.config.per_provider_timeout,
                    provider.query(&prompt),
                )
                .await;

                let result = match outcome {
                    Err(_elapsed) => Err(ProviderFailure {
                        provider_id: provider.id().to_string(),
                        reason: FailureReason::Timeout,
                    }),
                    Ok(Err(CoreError::CircuitOpen { .. })) => Err(ProviderFailure {
                        provider_id: provider.id().to_string(),
                        reason: FailureReason::CircuitOpen,
                    }),
                    Ok(Err(e)) => Err(ProviderFailure {
                        provider_id: provider.id().to_string(),
                        reason: FailureReason::Exception(e.to_string()),
                    }),
                    Ok(Ok(decision)) => {
                        match decision.validate(&self.config.fallback_sentinels) {
                            Ok(()) => Ok(decision),
                            Err(reason) => Err(ProviderFailure {
                                provider_id: provider.id().to_string(),
                                reason: FailureReason::InvalidResponse(reason),
                            }),
                        }
                    }
                };

                Collected {
                    provider_id: provider.id().to_string(),
                    is_local,
                    weight,
                    decision: result,
                }
            }
        });

        let mut collected: Vec<Collected> = futures::future::join_all(futures).await;
        // Deterministic order regardless of completion order: two identical
        // input sets always yield the same aggregate output.
        collected.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));

        self.combine(collected)
    }

    fn combine(&self, collected: Vec<Collected>) -> EnsembleDecision {
        let providers_queried: Vec<String> =
            collected.iter().map(|c| c.provider_id.clone()).collect();

        let original_weights: BTreeMap<String, f64> = collected
            .iter()
            .map(|c| (c.provider_id.clone(), c.weight))
            .collect();

        let active: Vec<&Collected> = collected
            .iter()
            .filter(|c| c.decision.is_ok())
            .collect();
        let failed: Vec<ProviderFailure> = collected
            .iter()
            .filter_map(|c| c.decision.as_ref().err().cloned())
            .collect();

        let providers_succeeded: Vec<String> =
            active.iter().map(|c| c.provider_id.clone()).collect();

        let renormalized_weights = renormalize(&collected);

        let quorum_satisfied = if self.config.min_local_providers == 0 {
            true
        } else {
            let local_successes = active.iter().filter(|c| c.is_local).count();
            local_successes >= self.config.min_local_providers
        };

        let (action, raw_confidence, reasoning, tier, agreement_score, confidence_variance) =
            if active.is_empty() {
                (
                    Action::Hold,
                    self.config.conservative_hold_confidence,
                    "all providers failed; defaulting to HOLD".to_string(),
                    FallbackTier::RuleBased,
                    0.0,
                    0.0,
                )
            } else if active.len() == 1 {
                let only = active[0].decision.as_ref().unwrap();
                (
                    only.action,
                    only.confidence,
                    only.reasoning.clone(),
                    FallbackTier::SingleProvider,
                    1.0,
                    0.0,
                )
            } else {
                let (action, confidence, reasoning) =
                    self.vote(&active, &renormalized_weights);
                let agreement = agreement_score(&active, action);
                let variance = confidence_variance(&active);
                (
                    action,
                    confidence,
                    reasoning,
                    FallbackTier::StrategyPrimary,
                    agreement,
                    variance,
                )
            };

        let calibrated_confidence = if matches!(tier, FallbackTier::RuleBased) {
            raw_confidence
        } else {
            calibrate(raw_confidence, active.len(), collected.len(), quorum_satisfied)
        };

        EnsembleDecision {
            action,
            confidence: calibrated_confidence,
            reasoning,
            suggested_amount: None,
            metadata: EnsembleMetadata {
                providers_queried,
                providers_succeeded,
                providers_failed: failed,
                original_weights,
                renormalized_weights,
                fallback_tier: tier,
                agreement_score,
                confidence_variance,
                quorum_satisfied,
                all_providers_failed: active.is_empty(),
                timestamp: Utc::now(),
            },
        }
    }

    /// Dispatch to the configured strategy. `Stacking` has no meta-learner
    /// implementation of its own, so it is treated as `Weighted` — see
    /// DESIGN.md's Open Question decision.
    fn vote(&self, active: &[&Collected], weights: &BTreeMap<String, f64>) -> (Action, f64, String) {
        match self.config.strategy {
            Strategy::Weighted | Strategy::Stacking => weighted_vote(active, weights),
            Strategy::Majority => majority_vote(active, weights),
        }
    }
}

fn renormalize(collected: &[Collected]) -> BTreeMap<String, f64> {
    let active: Vec<&Collected> = collected.iter().filter(|c| c.decision.is_ok()).collect();
    let total: f64 = active.iter().map(|c| c.weight).sum();

    let mut weights = BTreeMap::new();
    if active.is_empty() {
        for c in collected {
            weights.insert(c.provider_id.clone(), 0.0);
        }
        return weights;
    }

    if total <= 0.0 {
        let equal = 1.0 / active.len() as f64;
        for c in collected {
            weights.insert(
                c.provider_id.clone(),
                if c.decision.is_ok() { equal } else { 0.0 },
            );
        }
    } else {
        for c in collected {
            let w = if c.decision.is_ok() { c.weight / total } else { 0.0 };
            weights.insert(c.provider_id.clone(), w);
        }
    }
    weights
}

fn weighted_vote(active: &[&Collected], weights: &BTreeMap<String, f64>) -> (Action, f64, String) {
    let mut score: BTreeMap<Action, f64> = BTreeMap::new();
    for c in active {
        let decision = c.decision.as_ref().unwrap();
        let w = weights.get(&c.provider_id).copied().unwrap_or(0.0);
        *score.entry(decision.action).or_insert(0.0) += w;
    }

    let winner = argmax_action(&score);
    let winning_side: Vec<&Collected> = active
        .iter()
        .copied()
        .filter(|c| c.decision.as_ref().unwrap().action == winner)
        .collect();

    let confidence = mean_confidence(&winning_side);
    let reasoning = tagged_reasoning(&winning_side);
    (winner, confidence, reasoning)
}

fn majority_vote(active: &[&Collected], weights: &BTreeMap<String, f64>) -> (Action, f64, String) {
    let mut counts: BTreeMap<Action, usize> = BTreeMap::new();
    for c in active {
        *counts.entry(c.decision.as_ref().unwrap().action).or_insert(0) += 1;
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    let tied: Vec<Action> = counts
        .iter()
        .filter(|(_, count)| **count == max_count)
        .map(|(action, _)| *action)
        .collect();

    let winner = if tied.len() == 1 {
        tied[0]
    } else {
        // Tie broken by highest summed renormalized weight.
        tied.into_iter()
            .max_by(|a, b| {
                summed_weight(active, weights, *a)
                    .partial_cmp(&summed_weight(active, weights, *b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap()
    };

    let winning_side: Vec<&Collected> = active
        .iter()
        .copied()
        .filter(|c| c.decision.as_ref().unwrap().action == winner)
        .collect();

    let confidence = mean_confidence(&winning_side);
    let reasoning = tagged_reasoning(&winning_side);
    (winner, confidence, reasoning)
}

fn summed_weight(active: &[&Collected], weights: &BTreeMap<String, f64>, action: Action) -> f64 {
    active
        .iter()
        .filter(|c| c.decision.as_ref().unwrap().action == action)
        .map(|c| weights.get(&c.provider_id).copied().unwrap_or(0.0))
        .sum()
}

fn argmax_action(score: &BTreeMap<Action, f64>) -> Action {
    score
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(action, _)| *action)
        .unwrap_or(Action::Hold)
}

fn mean_confidence(side: &[&Collected]) -> f64 {
    if side.is_empty() {
        return 0.0;
    }
    let sum: f64 = side.iter().map(|c| c.decision.as_ref().unwrap().confidence).sum();
    sum / side.len() as f64
}

fn tagged_reasoning(side: &[&Collected]) -> String {
    side.iter()
        .map(|c| {
            let d = c.decision.as_ref().unwrap();
            format!("[{}] {}", c.provider_id, d.reasoning)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn agreement_score(active: &[&Collected], winner: Action) -> f64 {
    if active.is_empty() {
        return 0.0;
    }
    let winners = active
        .iter()
        .filter(|c| c.decision.as_ref().unwrap().action == winner)
        .count();
    winners as f64 / active.len() as f64
}

fn confidence_variance(active: &[&Collected]) -> f64 {
    if active.len() < 2 {
        return 0.0;
    }
    let mean = mean_confidence(active);
    let sum_sq: f64 = active
        .iter()
        .map(|c| {
            let d = c.decision.as_ref().unwrap().confidence - mean;
            d * d
        })
        .sum();
    sum_sq / active.len() as f64
}

fn calibrate(raw_confidence: f64, active_count: usize, total_providers: usize, quorum_satisfied: bool) -> f64 {
    if total_providers == 0 {
        return raw_confidence;
    }
    let factor = 0.7 + 0.3 * (active_count as f64 / total_providers as f64);
    let mut confidence = raw_confidence * factor;
    if !quorum_satisfied {
        confidence *= 0.7;
    }
    confidence.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSpec;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubProvider {
        id: String,
        local: bool,
        behavior: StubBehavior,
    }

    enum StubBehavior {
        Respond(Action, f64, &'static str),
        Timeout,
        Fail,
    }

    #[async_trait]
    impl ReasoningPort for StubProvider {
        async fn query(&self, _prompt: &str) -> Result<ProviderDecision, CoreError> {
            match &self.behavior {
                StubBehavior::Respond(action, confidence, reasoning) => Ok(ProviderDecision {
                    provider_id: self.id.clone(),
                    action: *action,
                    confidence: *confidence,
                    reasoning: reasoning.to_string(),
                    suggested_amount: None,
                    latency_ms: 5,
                }),
                StubBehavior::Timeout => {
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    unreachable!()
                }
                StubBehavior::Fail => Err(CoreError::TransientExternal {
                    target: self.id.clone(),
                    reason: "boom".into(),
                }),
            }
        }

        fn id(&self) -> &str {
            &self.id
        }

        fn is_local(&self) -> bool {
            self.local
        }
    }

    fn config(providers: Vec<(&str, f64)>) -> EnsembleConfig {
        EnsembleConfig {
            providers: providers
                .into_iter()
                .map(|(id, weight)| ProviderSpec {
                    id: id.to_string(),
                    weight,
                    local: false,
                })
                .collect(),
            strategy: Strategy::Weighted,
            min_local_providers: 0,
            per_provider_timeout: Duration::from_millis(100),
            conservative_hold_confidence: 50.0,
            fallback_sentinels: vec![],
        }
    }

    #[tokio::test]
    async fn s1_dynamic_weight_renormalization() {
        let cfg = config(vec![("P1", 0.25), ("P2", 0.25), ("P3", 0.25), ("P4", 0.25)]);
        let aggregator = EnsembleAggregator::new(cfg);

        let providers: Vec<Arc<dyn ReasoningPort>> = vec![
            Arc::new(StubProvider {
                id: "P1".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Buy, 80.0, "bullish"),
            }),
            Arc::new(StubProvider {
                id: "P2".into(),
                local: false,
                behavior: StubBehavior::Timeout,
            }),
            Arc::new(StubProvider {
                id: "P3".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Buy, 70.0, "momentum"),
            }),
            Arc::new(StubProvider {
                id: "P4".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Hold, 60.0, "wait"),
            }),
        ];

        let decision = aggregator.aggregate("prompt", &providers).await;

        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.metadata.providers_succeeded.len(), 3);
        assert_eq!(decision.metadata.providers_failed.len(), 1);
        assert_eq!(decision.metadata.providers_failed[0].provider_id, "P2");
        assert!(matches!(
            decision.metadata.providers_failed[0].reason,
            FailureReason::Timeout
        ));

        for (_id, w) in decision.metadata.renormalized_weights.iter() {
            if *w != 0.0 {
                assert!((w - 1.0 / 3.0).abs() < 1e-9);
            }
        }

        // raw confidence = mean(80,70) = 75; calibrated = 75 * (0.7 + 0.3*3/4)
        let expected = 75.0 * (0.7 + 0.3 * 0.75);
        assert!((decision.confidence - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn s2_all_providers_fail_returns_rule_based_hold() {
        let cfg = config(vec![("P1", 0.25), ("P2", 0.25), ("P3", 0.25), ("P4", 0.25)]);
        let aggregator = EnsembleAggregator::new(cfg);

        let providers: Vec<Arc<dyn ReasoningPort>> = (1..=4)
            .map(|i| {
                Arc::new(StubProvider {
                    id: format!("P{i}"),
                    local: false,
                    behavior: StubBehavior::Fail,
                }) as Arc<dyn ReasoningPort>
            })
            .collect();

        let decision = aggregator.aggregate("prompt", &providers).await;
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 50.0);
        assert!(decision.metadata.all_providers_failed);
        assert!(matches!(
            decision.metadata.fallback_tier,
            FallbackTier::RuleBased
        ));
    }

    #[tokio::test]
    async fn single_successful_provider_uses_tier_four() {
        let cfg = config(vec![("P1", 0.5), ("P2", 0.5)]);
        let aggregator = EnsembleAggregator::new(cfg);

        let providers: Vec<Arc<dyn ReasoningPort>> = vec![
            Arc::new(StubProvider {
                id: "P1".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Sell, 90.0, "reversal"),
            }),
            Arc::new(StubProvider {
                id: "P2".into(),
                local: false,
                behavior: StubBehavior::Fail,
            }),
        ];

        let decision = aggregator.aggregate("prompt", &providers).await;
        assert_eq!(decision.action, Action::Sell);
        assert!(matches!(
            decision.metadata.fallback_tier,
            FallbackTier::SingleProvider
        ));
        let expected = 90.0 * (0.7 + 0.3 * 0.5);
        assert!((decision.confidence - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn zero_weight_roster_falls_back_to_equal_weights() {
        let cfg = config(vec![("P1", 0.0), ("P2", 0.0)]);
        let aggregator = EnsembleAggregator::new(cfg);

        let providers: Vec<Arc<dyn ReasoningPort>> = vec![
            Arc::new(StubProvider {
                id: "P1".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Buy, 80.0, "x"),
            }),
            Arc::new(StubProvider {
                id: "P2".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Buy, 60.0, "y"),
            }),
        ];

        let decision = aggregator.aggregate("prompt", &providers).await;
        for w in decision.metadata.renormalized_weights.values() {
            assert!((w - 0.5).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn ordering_is_independent_of_completion_order() {
        let cfg = config(vec![("A", 0.5), ("B", 0.5)]);
        let aggregator = EnsembleAggregator::new(cfg);

        // B is slower than A but both well within the timeout; result
        // must still be identical to the reverse completion order.
        let providers: Vec<Arc<dyn ReasoningPort>> = vec![
            Arc::new(StubProvider {
                id: "A".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Buy, 80.0, "a"),
            }),
            Arc::new(StubProvider {
                id: "B".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Sell, 80.0, "b"),
            }),
        ];

        let first = aggregator.aggregate("prompt", &providers).await;
        let reordered: Vec<Arc<dyn ReasoningPort>> = vec![providers[1].clone(), providers[0].clone()];
        let second = aggregator.aggregate("prompt", &reordered).await;

        assert_eq!(first.metadata.providers_queried, second.metadata.providers_queried);
        assert_eq!(first.action, second.action);
    }

    #[tokio::test]
    async fn quorum_penalty_applies_when_local_providers_insufficient() {
        let mut cfg = config(vec![("P1", 0.5), ("P2", 0.5)]);
        cfg.min_local_providers = 1;
        let aggregator = EnsembleAggregator::new(cfg);

        let providers: Vec<Arc<dyn ReasoningPort>> = vec![
            Arc::new(StubProvider {
                id: "P1".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Buy, 80.0, "a"),
            }),
            Arc::new(StubProvider {
                id: "P2".into(),
                local: false,
                behavior: StubBehavior::Respond(Action::Buy, 80.0, "b"),
            }),
        ];

        let decision = aggregator.aggregate("prompt", &providers).await;
        assert!(!decision.metadata.quorum_satisfied);
        let without_penalty = 80.0 * (0.7 + 0.3 * 1.0);
        assert!((decision.confidence - without_penalty * 0.7).abs() < 1e-6);
    }
}
