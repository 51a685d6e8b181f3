use agent_core::domain::decision::{
    Action, EnsembleDecision, EnsembleMetadata, FallbackTier, TradeDecision,
};
use agent_core::domain::instrument::Instrument;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

fn base_ensemble(action: Action) -> EnsembleDecision {
    EnsembleDecision {
        action,
        confidence: 75.0,
        reasoning: "momentum breakout".into(),
        suggested_amount: None,
        metadata: EnsembleMetadata {
            providers_queried: vec!["local-momentum".into()],
            providers_succeeded: vec!["local-momentum".into()],
            providers_failed: vec![],
            original_weights: BTreeMap::from([("local-momentum".to_string(), 1.0)]),
            renormalized_weights: BTreeMap::from([("local-momentum".to_string(), 1.0)]),
            fallback_tier: FallbackTier::SingleProvider,
            agreement_score: 1.0,
            confidence_variance: 0.0,
            quorum_satisfied: false,
            all_providers_failed: false,
            timestamp: Utc::now(),
        },
    }
}

#[test]
fn zero_balance_forces_signal_only_with_no_sizing() {
    let instrument = Instrument::new("BTC/USD", "crypto");
    let decision = TradeDecision::new(
        base_ensemble(Action::Buy),
        instrument,
        dec!(65000),
        Some(Decimal::ZERO),
        0.01,
        0.02,
    );

    assert!(decision.signal_only);
    assert!(decision.risk_parameters.is_none());
    assert!(decision.position_type.is_some());
}

#[test]
fn missing_balance_forces_signal_only_with_no_sizing() {
    let instrument = Instrument::new("ETH/USD", "crypto");
    let decision = TradeDecision::new(
        base_ensemble(Action::Sell),
        instrument,
        dec!(3200),
        None,
        0.01,
        0.02,
    );

    assert!(decision.signal_only);
    assert!(decision.risk_parameters.is_none());
}

#[test]
fn funded_balance_produces_sized_decision_not_signal_only() {
    let instrument = Instrument::new("BTC/USD", "crypto");
    let decision = TradeDecision::new(
        base_ensemble(Action::Buy),
        instrument,
        dec!(65000),
        Some(dec!(100000)),
        0.01,
        0.02,
    );

    assert!(!decision.signal_only);
    let sizing = decision.risk_parameters.expect("funded buy must carry sizing");
    assert!(sizing.recommended_size > Decimal::ZERO);
}

#[test]
fn hold_action_is_always_signal_only_regardless_of_balance() {
    let instrument = Instrument::new("BTC/USD", "crypto");
    let decision = TradeDecision::new(
        base_ensemble(Action::Hold),
        instrument,
        dec!(65000),
        Some(dec!(100000)),
        0.01,
        0.02,
    );

    assert!(decision.signal_only);
    assert!(decision.position_type.is_none());
    assert!(decision.risk_parameters.is_none());
}
