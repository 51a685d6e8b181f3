use crate::application::ensemble_aggregator::EnsembleAggregator;
use crate::application::risk_gatekeeper::{Mode, RiskContext, RiskGatekeeper};
use crate::application::trade_monitor::{TrackedPositionMeta, TradeMonitor};
use crate::application::learning_memory::LearningMemory;
use crate::application::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::domain::decision::{
    Action, EnsembleDecision, EnsembleMetadata, FallbackTier, TradeDecision,
};
use crate::domain::errors::CoreError;
use crate::domain::instrument::Instrument;
use crate::domain::market::{MarketFrame, Timeframe};
use crate::domain::outcome::MarketRegime;
use crate::domain::portfolio::{EquityPoint, Portfolio};
use crate::domain::ports::{Clock, ExecutionPort, OrderRequest, PerceptionPort, ReasoningPort};
use crate::domain::position::Side;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// What one OODA cycle accomplished, emitted as a structured status at
/// the end of every cycle. No silent failures: a refusal to act always
/// names its cause.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub phase_reached: String,
    pub instruments_processed: usize,
    pub decisions_generated: usize,
    pub decisions_executed: usize,
    pub decisions_rejected: Vec<(String, String)>,
    pub open_tracker_count: usize,
    pub halt_reason: Option<String>,
    pub timestamp: chrono::DateTime<Utc>,
}

struct RuntimeState {
    day_marker: NaiveDate,
    daily_trade_count: u32,
    last_order_at: Option<chrono::DateTime<Utc>>,
    cumulative_realized_pnl: Decimal,
    instrument_failures: HashMap<String, u32>,
    equity_curve: Vec<EquityPoint>,
    halted: bool,
    halt_reason: Option<String>,
}

/// Binds C1–C5 and the external ports behind the OODA state machine:
/// `STARTUP → POSITION_RECOVERY → IDLE → [LEARNING → PERCEPTION →
/// REASONING → RISK_CHECK → EXECUTION → IDLE]* | HALT`.
pub struct AgentLoop {
    config: Config,
    perception: Arc<dyn PerceptionPort>,
    reasoning_providers: Vec<Arc<dyn ReasoningPort>>,
    ensemble: EnsembleAggregator,
    risk: RiskGatekeeper,
    execution: Arc<dyn ExecutionPort>,
    execution_breaker: CircuitBreaker,
    trade_monitor: Arc<TradeMonitor>,
    learning_memory: Arc<LearningMemory>,
    clock: Arc<dyn Clock>,
    outcome_rx: Mutex<tokio::sync::mpsc::UnboundedReceiver<crate::domain::outcome::TradeOutcome>>,
    cancel_tx: watch::Sender<bool>,
    runtime: Mutex<RuntimeState>,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        perception: Arc<dyn PerceptionPort>,
        reasoning_providers: Vec<Arc<dyn ReasoningPort>>,
        execution: Arc<dyn ExecutionPort>,
        trade_monitor: Arc<TradeMonitor>,
        learning_memory: Arc<LearningMemory>,
        clock: Arc<dyn Clock>,
        outcome_rx: tokio::sync::mpsc::UnboundedReceiver<crate::domain::outcome::TradeOutcome>,
    ) -> Self {
        let ensemble = EnsembleAggregator::new(config.ensemble.clone());
        let risk = RiskGatekeeper::new(config.risk);
        let execution_breaker = CircuitBreaker::new("execution", config.circuit_breaker);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            config,
            perception,
            reasoning_providers,
            ensemble,
            risk,
            execution,
            execution_breaker,
            trade_monitor,
            learning_memory,
            clock,
            outcome_rx: Mutex::new(outcome_rx),
            cancel_tx,
            runtime: Mutex::new(RuntimeState {
                day_marker: Utc::now().date_naive(),
                daily_trade_count: 0,
                last_order_at: None,
                cumulative_realized_pnl: Decimal::ZERO,
                instrument_failures: HashMap::new(),
                equity_curve: Vec::new(),
                halted: false,
                halt_reason: None,
            }),
        }
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Drives the full STARTUP → POSITION_RECOVERY → IDLE/cycle loop
    /// until cancelled or HALTed.
    pub async fn run(self: &Arc<Self>) {
        self.trade_monitor.start();

        let recovered = self.position_recovery().await;
        let mut skip_idle = recovered > 0;

        let mut cancel_rx = self.cancel_tx.subscribe();
        loop {
            if *cancel_rx.borrow() {
                break;
            }
            if !skip_idle {
                tokio::select! {
                    _ = self.clock.sleep(std::time::Duration::from_secs(
                        self.config.agent_loop.analysis_frequency_seconds,
                    )) => {}
                    _ = cancel_rx.changed() => break,
                }
            }
            skip_idle = false;

            if *cancel_rx.borrow() {
                break;
            }

            let report = self.run_cycle().await;
            info!(
                cycle_id = %report.cycle_id,
                phase = %report.phase_reached,
                instruments = report.instruments_processed,
                generated = report.decisions_generated,
                executed = report.decisions_executed,
                rejected = report.decisions_rejected.len(),
                trackers = report.open_tracker_count,
                halt = ?report.halt_reason,
                "cycle complete"
            );

            if report.halt_reason.is_some() {
                break;
            }
        }

        self.trade_monitor.shutdown().await;
    }

    /// Up to `position_recovery_attempts` tries with exponential backoff.
    /// On irrecoverable failure, degrade open: proceed to IDLE with an
    /// empty tracked set rather than block startup. Returns the number
    /// of positions recovered.
    async fn position_recovery(self: &Arc<Self>) -> usize {
        let mut backoff = self.config.agent_loop.position_recovery_initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.execution.list_positions().await {
                Ok(positions) => {
                    for position in &positions {
                        let action = match position.side {
                            Side::Long => Action::Buy,
                            Side::Short => Action::Sell,
                        };
                        let ensemble = EnsembleDecision {
                            action,
                            confidence: 0.0,
                            reasoning: "recovered from broker at startup".into(),
                            suggested_amount: None,
                            metadata: EnsembleMetadata {
                                providers_queried: vec![],
                                providers_succeeded: vec![],
                                providers_failed: vec![],
                                original_weights: Default::default(),
                                renormalized_weights: Default::default(),
                                fallback_tier: FallbackTier::RuleBased,
                                agreement_score: 0.0,
                                confidence_variance: 0.0,
                                quorum_satisfied: true,
                                all_providers_failed: false,
                                timestamp: Utc::now(),
                            },
                        };
                        let decision = TradeDecision::new(
                            ensemble,
                            position.instrument.clone(),
                            position.entry_price,
                            None,
                            self.config.agent_loop.risk_fraction,
                            self.config.agent_loop.stop_loss_fraction,
                        );
                        info!(
                            decision_id = %decision.decision_id,
                            instrument = %position.instrument,
                            "recovered open position at startup"
                        );

                        self.trade_monitor
                            .register(
                                position.clone(),
                                TrackedPositionMeta {
                                    decision_id: decision.decision_id,
                                    ai_provider: None,
                                    ensemble_providers: Vec::new(),
                                    decision_confidence: 0.0,
                                    market_regime_at_entry: MarketRegime::Unknown,
                                },
                            )
                            .await;
                    }
                    return positions.len();
                }
                Err(e) => {
                    warn!(attempt, error = %e, "position recovery attempt failed");
                    if attempt >= self.config.agent_loop.position_recovery_attempts {
                        error!("position recovery exhausted retries, proceeding with empty tracked set");
                        return 0;
                    }
                    self.clock.sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    /// One LEARNING → PERCEPTION → REASONING → RISK_CHECK → EXECUTION
    /// pass. Never wedges on a single bad dependency: per-provider
    /// errors die inside the Aggregator, per-instrument errors die
    /// inside this cycle.
    async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let mut decisions_generated = 0usize;
        let mut decisions_executed = 0usize;
        let mut decisions_rejected = Vec::new();

        // LEARNING
        self.drain_closed_trades().await;

        // PERCEPTION
        if let Some(reason) = self.check_kill_switch().await {
            let mut guard = self.runtime.lock().await;
            guard.halted = true;
            guard.halt_reason = Some(reason.clone());
            return CycleReport {
                cycle_id,
                phase_reached: "PERCEPTION".into(),
                instruments_processed: 0,
                decisions_generated: 0,
                decisions_executed: 0,
                decisions_rejected: vec![],
                open_tracker_count: self.trade_monitor.tracked_count().await,
                halt_reason: Some(reason),
                timestamp: Utc::now(),
            };
        }
        self.roll_daily_counter_if_needed().await;

        let frames = self.fetch_frames().await;

        // REASONING / RISK_CHECK / EXECUTION, per instrument.
        for (instrument, frame) in &frames {
            if self.instrument_skipped(instrument.symbol()).await {
                continue;
            }

            let ensemble_decision = self.reason_about(instrument, frame).await;
            self.update_instrument_failure(instrument.symbol(), ensemble_decision.metadata.all_providers_failed)
                .await;

            if ensemble_decision.action == Action::Hold && ensemble_decision.metadata.all_providers_failed {
                // S2: all providers failed; no Risk Gatekeeper call is made.
                continue;
            }

            let account = self.execution.account_info().await.ok();
            let balance = account.as_ref().map(|a| a.balance);
            let entry_price_reference = latest_close(frame).unwrap_or(Decimal::ZERO);

            let decision = TradeDecision::new(
                ensemble_decision,
                instrument.clone(),
                entry_price_reference,
                balance,
                self.config.agent_loop.risk_fraction,
                self.config.agent_loop.stop_loss_fraction,
            );
            decisions_generated += 1;

            if decision.signal_only {
                info!(decision_id = %decision.decision_id, "signal-only decision, execution skipped");
                continue;
            }

            match self.risk_check(&decision).await {
                Ok(()) => {}
                Err(e) => {
                    decisions_rejected.push((instrument.symbol().to_string(), e.to_string()));
                    continue;
                }
            }

            match self.execute(&decision).await {
                Ok(true) => decisions_executed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(decision_id = %decision.decision_id, error = %e, "execution failed");
                }
            }
        }

        CycleReport {
            cycle_id,
            phase_reached: "EXECUTION".into(),
            instruments_processed: frames.len(),
            decisions_generated,
            decisions_executed,
            decisions_rejected,
            open_tracker_count: self.trade_monitor.tracked_count().await,
            halt_reason: None,
            timestamp: Utc::now(),
        }
    }

    async fn drain_closed_trades(&self) {
        let mut rx = self.outcome_rx.lock().await;
        let mut closed = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            closed.push(outcome);
        }
        drop(rx);

        if closed.is_empty() {
            return;
        }

        let balance = self
            .execution
            .account_info()
            .await
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO);

        for outcome in closed {
            let pnl = outcome.realized_pnl;
            if let Err(e) = self.learning_memory.record(outcome).await {
                warn!(error = %e, "failed to record trade outcome");
                continue;
            }
            let mut guard = self.runtime.lock().await;
            guard.cumulative_realized_pnl += pnl;
            guard.equity_curve.push(EquityPoint {
                timestamp: Utc::now(),
                equity: balance + guard.cumulative_realized_pnl,
            });
        }
    }

    async fn check_kill_switch(&self) -> Option<String> {
        let guard = self.runtime.lock().await;
        if let Some(loss) = self.config.agent_loop.kill_switch_loss {
            if guard.cumulative_realized_pnl <= -loss {
                return Some(format!(
                    "kill_switch_loss crossed: cumulative pnl {} <= -{}",
                    guard.cumulative_realized_pnl, loss
                ));
            }
        }
        if let Some(gain) = self.config.agent_loop.kill_switch_gain {
            if guard.cumulative_realized_pnl >= gain {
                return Some(format!(
                    "kill_switch_gain crossed: cumulative pnl {} >= {}",
                    guard.cumulative_realized_pnl, gain
                ));
            }
        }
        None
    }

    async fn roll_daily_counter_if_needed(&self) {
        let today = self.clock.now().date_naive();
        let mut guard = self.runtime.lock().await;
        if guard.day_marker != today {
            guard.day_marker = today;
            guard.daily_trade_count = 0;
        }
    }

    async fn fetch_frames(&self) -> Vec<(Instrument, MarketFrame)> {
        let mut frames = Vec::new();
        for raw_symbol in &self.config.agent_loop.watched_instruments {
            let instrument = Instrument::new(raw_symbol, "crypto");
            match self
                .perception
                .fetch_frame(&instrument, &[Timeframe::H1])
                .await
            {
                Ok(frame) => frames.push((instrument, frame)),
                Err(e) => {
                    warn!(instrument = %instrument, error = %e, "perception fetch failed, skipping instrument this cycle");
                }
            }
        }
        frames
    }

    async fn instrument_skipped(&self, symbol: &str) -> bool {
        let guard = self.runtime.lock().await;
        guard
            .instrument_failures
            .get(symbol)
            .copied()
            .unwrap_or(0)
            >= self.config.agent_loop.instrument_failure_skip_threshold
    }

    async fn update_instrument_failure(&self, symbol: &str, failed: bool) {
        let mut guard = self.runtime.lock().await;
        let counter = guard.instrument_failures.entry(symbol.to_string()).or_insert(0);
        if failed {
            *counter += 1;
        } else if *counter > 0 {
            *counter -= 1;
        }
    }

    async fn reason_about(&self, instrument: &Instrument, frame: &MarketFrame) -> EnsembleDecision {
        let context = self
            .learning_memory
            .context_for(instrument.symbol(), self.config.learning.context_window_trades)
            .await;
        let prompt = format!(
            "instrument={} monitoring_context={} recent_performance={}",
            instrument, frame.monitoring_context, context
        );

        let mut backoff = std::time::Duration::from_secs(1);
        let mut last = None;
        for attempt in 0..self.config.agent_loop.max_decision_retries {
            let decision = self.ensemble.aggregate(&prompt, &self.reasoning_providers).await;
            let all_failed = decision.metadata.all_providers_failed;
            last = Some(decision);
            if !all_failed {
                break;
            }
            if attempt + 1 < self.config.agent_loop.max_decision_retries {
                self.clock.sleep(backoff).await;
                backoff *= 2;
            }
        }
        last.expect("at least one aggregation attempt always runs")
    }

    async fn risk_check(&self, decision: &TradeDecision) -> Result<(), CoreError> {
        let guard = self.runtime.lock().await;
        let portfolio = Portfolio::default();
        let holdings = HashMap::new();
        let correlations = HashMap::new();
        let ctx = RiskContext {
            current_holdings: &holdings,
            portfolio: &portfolio,
            equity_curve: &guard.equity_curve,
            initial_balance: Decimal::ZERO,
            timestamp_raw: &decision.metadata.timestamp.to_rfc3339(),
            mode: Mode::Live,
            correlations: &correlations,
            daily_var_fraction: 0.0,
        };
        self.risk.validate(decision, &ctx)
    }

    /// Returns `Ok(true)` if an order was submitted, `Ok(false)` if the
    /// throttle suppressed it (not an error — the cycle continues).
    async fn execute(&self, decision: &TradeDecision) -> Result<bool, CoreError> {
        {
            let guard = self.runtime.lock().await;
            if let Some(last) = guard.last_order_at {
                let elapsed = (Utc::now() - last).num_seconds();
                if elapsed < self.config.agent_loop.decision_throttle_seconds as i64 {
                    return Ok(false);
                }
            }
        }

        let risk_params = decision
            .risk_parameters
            .as_ref()
            .expect("non-signal-only decisions always carry risk parameters");

        let order = OrderRequest {
            instrument: decision.instrument.clone(),
            side: decision.action,
            quantity: risk_params.recommended_size,
            reference_price: decision.entry_price_reference,
        };

        let execution = self.execution.clone();
        let submitted = self
            .execution_breaker
            .call(move || {
                let order = order.clone();
                let execution = execution.clone();
                async move { execution.submit(order).await }
            })
            .await;

        match submitted {
            Ok(_ack) => {
                let mut guard = self.runtime.lock().await;
                guard.daily_trade_count += 1;
                guard.last_order_at = Some(Utc::now());
                drop(guard);

                if let Ok(positions) = self.execution.list_positions().await {
                    if let Some(position) = positions
                        .into_iter()
                        .find(|p| p.instrument.symbol() == decision.instrument.symbol())
                    {
                        self.trade_monitor
                            .register(
                                position,
                                TrackedPositionMeta {
                                    decision_id: decision.decision_id,
                                    ai_provider: decision.metadata.providers_succeeded.first().cloned(),
                                    ensemble_providers: decision.metadata.providers_succeeded.clone(),
                                    decision_confidence: decision.confidence,
                                    market_regime_at_entry: MarketRegime::Unknown,
                                },
                            )
                            .await;
                    } else {
                        warn!(decision_id = %decision.decision_id, "submitted position not found on broker, detector will pick it up");
                    }
                }
                Ok(true)
            }
            Err(crate::application::circuit_breaker::CircuitBreakerError::Open(name)) => {
                Err(CoreError::CircuitOpen { target: name })
            }
            Err(crate::application::circuit_breaker::CircuitBreakerError::Inner(e)) => Err(e),
        }
    }
}

fn latest_close(frame: &MarketFrame) -> Option<Decimal> {
    frame
        .ohlcv_windows
        .get(&Timeframe::H1)
        .and_then(|candles| candles.last())
        .map(|c| c.close)
        .or_else(|| {
            frame
                .ohlcv_windows
                .values()
                .flatten()
                .last()
                .map(|c| c.close)
        })
}
