use crate::domain::instrument::Instrument;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionType {
    Long,
    Short,
}

/// A single reasoning provider's raw response. `validate` is what turns a
/// well-formed-but-nonsensical reply into the same shape an exception or
/// timeout would produce: an `AggregationFailure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDecision {
    pub provider_id: String,
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_amount: Option<Decimal>,
    pub latency_ms: u64,
}

impl ProviderDecision {
    /// A response is invalid if confidence falls outside `[0,100]` or the
    /// reasoning text matches a configured fallback sentinel. Action being
    /// outside the enum can't be represented once deserialized into
    /// `Action`, so that check happens at the adapter boundary, before
    /// this type is constructed.
    pub fn validate(&self, fallback_sentinels: &[String]) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(format!("confidence {} out of [0,100]", self.confidence));
        }
        for sentinel in fallback_sentinels {
            if self.reasoning.contains(sentinel.as_str()) {
                return Err(format!("reasoning matched fallback sentinel {sentinel:?}"));
            }
        }
        Ok(())
    }
}

/// Why a provider did not contribute a vote to an ensemble decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FailureReason {
    Timeout,
    Exception(String),
    InvalidResponse(String),
    CircuitOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub reason: FailureReason,
}

/// Everything the Ensemble Aggregator wants to publish alongside its
/// decision: who was queried, who answered, who failed and why, the
/// weight bookkeeping, and the headline quality signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleMetadata {
    pub providers_queried: Vec<String>,
    pub providers_succeeded: Vec<String>,
    pub providers_failed: Vec<ProviderFailure>,
    pub original_weights: std::collections::BTreeMap<String, f64>,
    pub renormalized_weights: std::collections::BTreeMap<String, f64>,
    pub fallback_tier: FallbackTier,
    pub agreement_score: f64,
    pub confidence_variance: f64,
    pub quorum_satisfied: bool,
    pub all_providers_failed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackTier {
    StrategyPrimary,
    Majority,
    SimpleAverage,
    SingleProvider,
    RuleBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleDecision {
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_amount: Option<Decimal>,
    pub metadata: EnsembleMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    pub stop_loss_fraction: f64,
    pub risk_fraction: f64,
    pub recommended_size: Decimal,
}

/// An `EnsembleDecision` augmented with everything needed to act on it.
/// `signal_only` and `risk_parameters`/`position_type` are kept in sync by
/// construction — see [`TradeDecision::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    pub decision_id: Uuid,
    pub instrument: Instrument,
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub metadata: EnsembleMetadata,
    pub entry_price_reference: Decimal,
    pub position_type: Option<PositionType>,
    pub signal_only: bool,
    pub risk_parameters: Option<RiskParameters>,
}

impl TradeDecision {
    /// Build from an ensemble decision and the current portfolio balance.
    /// `balance` being `None`, zero, or otherwise unusable forces
    /// `signal_only = true` with every sizing field null — this is the
    /// single constructor site that enforces the
    /// `signal_only ⇔ recommended_size is null` invariant.
    pub fn new(
        ensemble: EnsembleDecision,
        instrument: Instrument,
        entry_price_reference: Decimal,
        balance: Option<Decimal>,
        risk_fraction: f64,
        stop_loss_fraction: f64,
    ) -> Self {
        let position_type = match ensemble.action {
            Action::Buy => Some(PositionType::Long),
            Action::Sell => Some(PositionType::Short),
            Action::Hold => None,
        };

        let usable_balance = balance.filter(|b| *b > Decimal::ZERO);

        let (signal_only, risk_parameters) = match (usable_balance, position_type) {
            (Some(balance), Some(_)) if entry_price_reference > Decimal::ZERO => {
                let recommended_size = balance
                    * Decimal::try_from(risk_fraction).unwrap_or(Decimal::ZERO)
                    / entry_price_reference;
                (
                    false,
                    Some(RiskParameters {
                        stop_loss_fraction,
                        risk_fraction,
                        recommended_size,
                    }),
                )
            }
            _ => (true, None),
        };

        Self {
            decision_id: Uuid::new_v4(),
            instrument,
            action: ensemble.action,
            confidence: ensemble.confidence,
            reasoning: ensemble.reasoning,
            metadata: ensemble.metadata,
            entry_price_reference,
            position_type,
            signal_only,
            risk_parameters,
        }
    }
}
