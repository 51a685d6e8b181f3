use crate::config::RiskConfig;
use crate::domain::decision::{Action, TradeDecision};
use crate::domain::errors::CoreError;
use crate::domain::instrument::AssetClass;
use crate::domain::portfolio::{EquityPoint, Portfolio};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;

/// Whether the caller is driving the gatekeeper from the wall clock or
/// from historical data. Carried on the call, not as a constructor flag,
/// so a replay harness can never accidentally fall back to the live
/// clock — the single most important fairness invariant during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Replay,
}

#[derive(Debug, Clone)]
pub struct RiskContext<'a> {
    pub current_holdings: &'a HashMap<String, rust_decimal::Decimal>,
    pub portfolio: &'a Portfolio,
    pub equity_curve: &'a [EquityPoint],
    pub initial_balance: rust_decimal::Decimal,
    pub timestamp_raw: &'a str,
    pub mode: Mode,
    /// Pairwise historical correlation of each already-open instrument
    /// against the candidate, keyed by instrument symbol.
    pub correlations: &'a HashMap<String, f64>,
    /// One-day 95%-confidence VaR estimate as a fraction of equity.
    pub daily_var_fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub code: &'static str,
    pub reason: String,
}

pub type ValidationOutcome = Result<(), Rejection>;

/// Stateless pre-execution validator. A pure function of `(decision,
/// context)` — no internal state, no side effects.
pub struct RiskGatekeeper {
    config: RiskConfig,
}

impl RiskGatekeeper {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Runs every check in order; the first failure short-circuits with
    /// its reason. Returns `Ok(())` only if all checks pass.
    pub fn validate(
        &self,
        decision: &TradeDecision,
        ctx: &RiskContext<'_>,
    ) -> Result<(), CoreError> {
        if decision.action == Action::Hold {
            return Ok(());
        }

        self.check_market_hours(decision, ctx)
            .and_then(|_| self.check_max_drawdown(ctx))
            .and_then(|_| self.check_daily_var(ctx))
            .and_then(|_| self.check_concentration(decision, ctx))
            .and_then(|_| self.check_correlation(decision, ctx))
            .and_then(|_| self.check_confidence_floor(decision))
            .and_then(|_| self.check_asset_class(decision))
            .map_err(|rejection| {
                if rejection.code == "replay_timestamp_unparseable" {
                    CoreError::ReplayTimestampError {
                        raw: ctx.timestamp_raw.to_string(),
                    }
                } else {
                    CoreError::PolicyRejection {
                        reason: format!("{}: {}", rejection.code, rejection.reason),
                    }
                }
            })
    }

    fn check_market_hours(
        &self,
        decision: &TradeDecision,
        ctx: &RiskContext<'_>,
    ) -> ValidationOutcome {
        if decision.instrument.asset_class == AssetClass::Crypto {
            // Crypto trades 24/7; no session to check.
            return Ok(());
        }

        match DateTime::parse_from_rfc3339(ctx.timestamp_raw) {
            Ok(parsed) => {
                if is_market_open(parsed.with_timezone(&Utc)) {
                    Ok(())
                } else {
                    Err(Rejection {
                        code: "market_closed",
                        reason: "instrument session is closed at this timestamp".into(),
                    })
                }
            }
            Err(_) if ctx.mode == Mode::Live => {
                tracing::warn!(
                    raw = ctx.timestamp_raw,
                    "unparseable timestamp in live mode, assuming market open"
                );
                Ok(())
            }
            Err(_) => Err(Rejection {
                code: "replay_timestamp_unparseable",
                reason: format!("cannot parse {:?} during replay", ctx.timestamp_raw),
            }),
        }
    }

    fn check_max_drawdown(&self, ctx: &RiskContext<'_>) -> ValidationOutcome {
        let Some(drawdown) = running_drawdown(ctx.equity_curve) else {
            return Ok(());
        };
        if drawdown >= self.config.max_drawdown_pct {
            return Err(Rejection {
                code: "max_drawdown_exceeded",
                reason: format!(
                    "drawdown {:.4} >= cap {:.4}",
                    drawdown, self.config.max_drawdown_pct
                ),
            });
        }
        Ok(())
    }

    fn check_daily_var(&self, ctx: &RiskContext<'_>) -> ValidationOutcome {
        if ctx.daily_var_fraction > self.config.max_daily_var_pct {
            return Err(Rejection {
                code: "daily_var_exceeded",
                reason: format!(
                    "estimated VaR {:.4} > cap {:.4}",
                    ctx.daily_var_fraction, self.config.max_daily_var_pct
                ),
            });
        }
        Ok(())
    }

    fn check_concentration(
        &self,
        decision: &TradeDecision,
        ctx: &RiskContext<'_>,
    ) -> ValidationOutcome {
        let Some(risk_params) = &decision.risk_parameters else {
            return Ok(());
        };
        let equity = ctx.portfolio.total_equity(ctx.current_holdings);
        if equity <= rust_decimal::Decimal::ZERO {
            return Ok(());
        }
        let existing = ctx
            .portfolio
            .position_value(decision.instrument.symbol(), ctx.current_holdings);
        let proposed_value = risk_params.recommended_size * decision.entry_price_reference;
        let share = ((existing + proposed_value) / equity).to_f64().unwrap_or(0.0);
        if share > self.config.max_position_concentration_pct {
            return Err(Rejection {
                code: "concentration_exceeded",
                reason: format!(
                    "proposed share {:.4} > cap {:.4}",
                    share, self.config.max_position_concentration_pct
                ),
            });
        }
        Ok(())
    }

    fn check_correlation(
        &self,
        decision: &TradeDecision,
        ctx: &RiskContext<'_>,
    ) -> ValidationOutcome {
        let correlated_count = ctx
            .correlations
            .iter()
            .filter(|(symbol, corr)| {
                symbol.as_str() != decision.instrument.symbol() && **corr >= self.config.correlation_cap
            })
            .count();
        if correlated_count > self.config.max_correlated_positions {
            return Err(Rejection {
                code: "correlation_limit_exceeded",
                reason: format!(
                    "{} positions correlated >= {:.2} (cap {})",
                    correlated_count, self.config.correlation_cap, self.config.max_correlated_positions
                ),
            });
        }
        Ok(())
    }

    fn check_confidence_floor(&self, decision: &TradeDecision) -> ValidationOutcome {
        if decision.confidence < self.config.confidence_threshold {
            return Err(Rejection {
                code: "confidence_below_floor",
                reason: format!(
                    "confidence {:.1} < threshold {:.1}",
                    decision.confidence, self.config.confidence_threshold
                ),
            });
        }
        Ok(())
    }

    fn check_asset_class(&self, decision: &TradeDecision) -> ValidationOutcome {
        // AssetClass::normalize is total, so every value that reaches here
        // is already in the canonical set by construction. This check
        // exists to give a distinct, named rejection if that invariant is
        // ever violated upstream.
        match decision.instrument.asset_class {
            AssetClass::Crypto | AssetClass::Forex | AssetClass::Equity => Ok(()),
        }
    }
}

fn running_drawdown(curve: &[EquityPoint]) -> Option<f64> {
    if curve.is_empty() {
        return None;
    }
    let mut peak = curve[0].equity;
    let mut max_drawdown = 0.0_f64;
    for point in curve {
        if point.equity > peak {
            peak = point.equity;
        }
        if peak > rust_decimal::Decimal::ZERO {
            let dd = ((peak - point.equity) / peak).to_f64().unwrap_or(0.0);
            if dd > max_drawdown {
                max_drawdown = dd;
            }
        }
    }
    Some(max_drawdown)
}

/// Simplified regular-session check: weekdays, 00:00–23:59 UTC placeholder
/// for a real exchange calendar. Concrete session calendars are a
/// data-provider concern outside the core's scope; this exists only to
/// give the check something deterministic to evaluate against during
/// replay.
fn is_market_open(ts: DateTime<Utc>) -> bool {
    !matches!(ts.weekday(), Weekday::Sat | Weekday::Sun) && ts.hour() < 24
}
