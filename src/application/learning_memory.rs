use crate::config::LearningConfig;
use crate::domain::errors::CoreError;
use crate::domain::outcome::TradeOutcome;
use crate::domain::ports::StorageSink;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProviderPerformance {
    pub win_rate: f64,
    pub trade_count: usize,
    pub avg_pnl: Decimal,
    pub sharpe: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Momentum {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LongTermStats {
    pub realized_pnl: Decimal,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
    pub momentum: Momentum,
    pub trade_count: usize,
}

/// A point-in-time copy of the memory's state, used by replay harnesses
/// to undo mutations made during an out-of-sample window.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    outcomes: BTreeMap<(DateTime<Utc>, Uuid), TradeOutcome>,
    seen_ids: HashSet<Uuid>,
    readonly: bool,
}

struct State {
    outcomes: BTreeMap<(DateTime<Utc>, Uuid), TradeOutcome>,
    seen_ids: HashSet<Uuid>,
    readonly: bool,
}

/// The sole substrate for cross-run learning. Append-only, content-keyed
/// by `decision_id`.
pub struct LearningMemory {
    config: LearningConfig,
    storage: Arc<dyn StorageSink>,
    state: RwLock<State>,
}

impl LearningMemory {
    /// Scan storage, load every outcome, and rebuild in-memory aggregates
    /// in one pass. Duplicate `decision_id`s on disk are a data-integrity
    /// violation: the first is kept, the rest are logged and skipped.
    pub async fn bootstrap(
        config: LearningConfig,
        storage: Arc<dyn StorageSink>,
    ) -> Result<Self, CoreError> {
        let loaded = storage.list().await?;
        let mut outcomes = BTreeMap::new();
        let mut seen_ids = HashSet::new();

        for outcome in loaded {
            if !seen_ids.insert(outcome.decision_id) {
                warn!(
                    decision_id = %outcome.decision_id,
                    "duplicate decision_id on load, quarantining"
                );
                continue;
            }
            outcomes.insert((outcome.exit_ts, outcome.decision_id), outcome);
        }

        while outcomes.len() > config.max_memory_size {
            if let Some((key, _)) = outcomes.iter().next().map(|(k, v)| (*k, v.decision_id)) {
                outcomes.remove(&key);
            }
        }

        Ok(Self {
            config,
            storage,
            state: RwLock::new(State {
                outcomes,
                seen_ids,
                readonly: false,
            }),
        })
    }

    /// Append a Trade Outcome. Idempotent on `decision_id`; a no-op while
    /// the memory is read-only (replay out-of-sample protection).
    pub async fn record(&self, outcome: TradeOutcome) -> Result<(), CoreError> {
        {
            let guard = self.state.read().await;
            if guard.readonly {
                debug!(decision_id = %outcome.decision_id, "memory is read-only, dropping record");
                return Ok(());
            }
            if guard.seen_ids.contains(&outcome.decision_id) {
                debug!(decision_id = %outcome.decision_id, "outcome already recorded, skipping");
                return Ok(());
            }
        }

        self.storage.append(&outcome).await?;

        let mut guard = self.state.write().await;
        if !guard.seen_ids.insert(outcome.decision_id) {
            return Ok(());
        }
        guard
            .outcomes
            .insert((outcome.exit_ts, outcome.decision_id), outcome);

        while guard.outcomes.len() > self.config.max_memory_size {
            if let Some(key) = guard.outcomes.keys().next().copied() {
                guard.outcomes.remove(&key);
            } else {
                break;
            }
        }
        Ok(())
    }

    pub async fn outcome_count(&self) -> usize {
        self.state.read().await.outcomes.len()
    }

    /// Per-provider rollup attributed over each outcome's
    /// `ensemble_providers` (falling back to `ai_provider` for legacy
    /// single-provider outcomes).
    pub async fn provider_performance(&self) -> HashMap<String, ProviderPerformance> {
        let guard = self.state.read().await;
        let mut pnls: HashMap<String, Vec<Decimal>> = HashMap::new();

        for outcome in guard.outcomes.values() {
            let providers: Vec<&String> = if !outcome.ensemble_providers.is_empty() {
                outcome.ensemble_providers.iter().collect()
            } else {
                outcome.ai_provider.iter().collect()
            };
            for provider in providers {
                pnls.entry(provider.clone()).or_default().push(outcome.realized_pnl);
            }
        }

        pnls.into_iter()
            .map(|(provider, trades)| {
                let trade_count = trades.len();
                let wins = trades.iter().filter(|p| **p > Decimal::ZERO).count();
                let win_rate = if trade_count == 0 {
                    0.0
                } else {
                    wins as f64 / trade_count as f64
                };
                let sum: Decimal = trades.iter().sum();
                let avg_pnl = if trade_count == 0 {
                    Decimal::ZERO
                } else {
                    sum / Decimal::from(trade_count)
                };
                let sharpe = sharpe_ratio(&trades);
                (
                    provider,
                    ProviderPerformance {
                        win_rate,
                        trade_count,
                        avg_pnl,
                        sharpe,
                    },
                )
            })
            .collect()
    }

    /// Realized P&L, win rate, profit factor, Sharpe, best/worst trade,
    /// and momentum (first half vs. second half of the window) over the
    /// trailing `window_days`, optionally scoped to one instrument.
    pub async fn long_term_performance(
        &self,
        window_days: i64,
        instrument: Option<&str>,
    ) -> LongTermStats {
        let guard = self.state.read().await;
        let cutoff = Utc::now() - ChronoDuration::days(window_days);

        let mut window: Vec<&TradeOutcome> = guard
            .outcomes
            .values()
            .filter(|o| o.exit_ts >= cutoff)
            .filter(|o| instrument.map(|sym| o.instrument.symbol() == sym).unwrap_or(true))
            .collect();
        window.sort_by_key(|o| o.exit_ts);

        if window.is_empty() {
            return LongTermStats {
                realized_pnl: Decimal::ZERO,
                win_rate: 0.0,
                profit_factor: 0.0,
                sharpe: 0.0,
                best_trade: None,
                worst_trade: None,
                momentum: Momentum::Stable,
                trade_count: 0,
            };
        }

        let realized_pnl: Decimal = window.iter().map(|o| o.realized_pnl).sum();
        let wins = window.iter().filter(|o| o.is_win()).count();
        let win_rate = wins as f64 / window.len() as f64;

        let gross_profit: Decimal = window
            .iter()
            .map(|o| o.realized_pnl)
            .filter(|p| *p > Decimal::ZERO)
            .sum();
        let gross_loss: Decimal = window
            .iter()
            .map(|o| o.realized_pnl)
            .filter(|p| *p < Decimal::ZERO)
            .sum();
        let profit_factor = if gross_loss.is_zero() {
            if gross_profit.is_zero() {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            (gross_profit / gross_loss.abs()).to_f64().unwrap_or(0.0)
        };

        let pnls: Vec<Decimal> = window.iter().map(|o| o.realized_pnl).collect();
        let sharpe = sharpe_ratio(&pnls).unwrap_or(0.0);

        let best_trade = window.iter().map(|o| o.realized_pnl).max();
        let worst_trade = window.iter().map(|o| o.realized_pnl).min();

        let midpoint = window.len() / 2;
        let momentum = if midpoint == 0 {
            Momentum::Stable
        } else {
            let first_half_avg = mean(&pnls[..midpoint]);
            let second_half_avg = mean(&pnls[midpoint..]);
            if second_half_avg > first_half_avg * 1.05 {
                Momentum::Improving
            } else if second_half_avg < first_half_avg * 0.95 {
                Momentum::Declining
            } else {
                Momentum::Stable
            }
        };

        LongTermStats {
            realized_pnl,
            win_rate,
            profit_factor,
            sharpe,
            best_trade,
            worst_trade,
            momentum,
            trade_count: window.len(),
        }
    }

    /// Formatted recent-performance summary for prompt injection.
    pub async fn context_for(&self, instrument: &str, window: usize) -> String {
        let guard = self.state.read().await;
        let mut recent: Vec<&TradeOutcome> = guard
            .outcomes
            .values()
            .filter(|o| o.instrument.symbol() == instrument)
            .collect();
        recent.sort_by_key(|o| std::cmp::Reverse(o.exit_ts));
        recent.truncate(window);

        if recent.is_empty() {
            return format!("no recent trade history for {instrument}");
        }

        let wins = recent.iter().filter(|o| o.is_win()).count();
        let total_pnl: Decimal = recent.iter().map(|o| o.realized_pnl).sum();
        format!(
            "{instrument}: last {count} trades, {wins}/{count} wins, cumulative pnl {total_pnl}",
            count = recent.len(),
        )
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        let guard = self.state.read().await;
        MemorySnapshot {
            outcomes: guard.outcomes.clone(),
            seen_ids: guard.seen_ids.clone(),
            readonly: guard.readonly,
        }
    }

    pub async fn restore(&self, snapshot: MemorySnapshot) {
        let mut guard = self.state.write().await;
        guard.outcomes = snapshot.outcomes;
        guard.seen_ids = snapshot.seen_ids;
        guard.readonly = snapshot.readonly;
    }

    pub async fn set_readonly(&self, readonly: bool) {
        self.state.write().await.readonly = readonly;
    }
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = values.iter().sum();
    sum / Decimal::from(values.len())
}

fn sharpe_ratio(pnls: &[Decimal]) -> Option<f64> {
    if pnls.len() < 2 {
        return None;
    }
    let values: Vec<f64> = pnls.iter().filter_map(|d| d.to_f64()).collect();
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return None;
    }
    Some(mean / stddev * (values.len() as f64).sqrt())
}
