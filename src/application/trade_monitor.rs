use crate::config::TradeMonitorConfig;
use crate::domain::outcome::{ExitReason, MarketRegime, TradeOutcome};
use crate::domain::ports::{Clock, ExecutionPort};
use crate::domain::position::{Position, Side};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the Trade Monitor needs about a position beyond what the
/// broker reports: which decision opened it. Synthesized positions
/// (startup recovery, out-of-band detection) carry a null provider
/// lineage.
#[derive(Debug, Clone)]
pub struct TrackedPositionMeta {
    pub decision_id: Uuid,
    pub ai_provider: Option<String>,
    pub ensemble_providers: Vec<String>,
    pub decision_confidence: f64,
    pub market_regime_at_entry: MarketRegime,
}

impl TrackedPositionMeta {
    /// Metadata used when a position is discovered rather than opened by
    /// this process (startup recovery, detector drift-catch).
    pub fn synthesized() -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            ai_provider: None,
            ensemble_providers: Vec::new(),
            decision_confidence: 0.0,
            market_regime_at_entry: MarketRegime::Unknown,
        }
    }
}

struct TrackedEntry {
    meta: TrackedPositionMeta,
}

/// Owns the lifecycle of watching broker-side positions until they
/// close: a detector task, a bounded tracker pool, and a FIFO pending
/// queue for overflow.
pub struct TradeMonitor {
    config: TradeMonitorConfig,
    execution: Arc<dyn ExecutionPort>,
    clock: Arc<dyn Clock>,
    tracked: Arc<Mutex<HashMap<Uuid, TrackedEntry>>>,
    pending: Arc<Mutex<VecDeque<(Position, TrackedPositionMeta)>>>,
    semaphore: Arc<Semaphore>,
    outcome_tx: mpsc::UnboundedSender<TradeOutcome>,
    cancel_tx: watch::Sender<bool>,
    detector_handle: Mutex<Option<JoinHandle<()>>>,
    tracker_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TradeMonitor {
    pub fn new(
        config: TradeMonitorConfig,
        execution: Arc<dyn ExecutionPort>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<TradeOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (cancel_tx, _) = watch::channel(false);
        let monitor = Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_trackers)),
            config,
            execution,
            clock,
            tracked: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            outcome_tx,
            cancel_tx,
            detector_handle: Mutex::new(None),
            tracker_handles: Arc::new(Mutex::new(Vec::new())),
        };
        (monitor, outcome_rx)
    }

    pub async fn tracked_count(&self) -> usize {
        self.tracked.lock().await.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Register a position the Agent Loop just opened (EXECUTION) or
    /// recovered (POSITION_RECOVERY). Idempotent: re-registering an
    /// already-tracked or already-pending position is a no-op.
    pub async fn register(self: &Arc<Self>, position: Position, meta: TrackedPositionMeta) {
        self.admit_or_enqueue(position, meta).await;
    }

    /// Start the recurring detector task. Returns immediately; the task
    /// runs until `shutdown` is called.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(this.config.detection_interval) => {}
                    _ = cancel_rx.changed() => break,
                }
                if let Err(e) = this.detect_once().await {
                    warn!(error = %e, "detector scan failed");
                }
            }
            debug!("detector task stopped");
        });
        if let Ok(mut guard) = self.detector_handle.try_lock() {
            *guard = Some(handle);
        }
    }

    async fn detect_once(self: &Arc<Self>) -> Result<(), crate::domain::errors::CoreError> {
        let positions = self.execution.list_positions().await?;
        for position in positions {
            let already_tracked = self.tracked.lock().await.contains_key(&position.position_id);
            let already_pending = self
                .pending
                .lock()
                .await
                .iter()
                .any(|(p, _)| p.position_id == position.position_id);
            if already_tracked || already_pending {
                continue;
            }
            info!(position_id = %position.position_id, "detector found untracked position");
            self.admit_or_enqueue(position, TrackedPositionMeta::synthesized())
                .await;
        }
        Ok(())
    }

    async fn admit_or_enqueue(self: &Arc<Self>, position: Position, meta: TrackedPositionMeta) {
        {
            let tracked = self.tracked.lock().await;
            if tracked.contains_key(&position.position_id) {
                return;
            }
        }
        {
            let mut pending = self.pending.lock().await;
            if pending.iter().any(|(p, _)| p.position_id == position.position_id) {
                return;
            }
        }

        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                self.tracked
                    .lock()
                    .await
                    .insert(position.position_id, TrackedEntry { meta: meta.clone() });
                self.spawn_tracker(position, meta, permit);
            }
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.push_back((position, meta));
                warn!(
                    pending = pending.len(),
                    "tracker pool saturated, position queued"
                );
                if pending.len() > self.config.pending_high_water_mark {
                    if let Some((dropped, _)) = pending.pop_front() {
                        warn!(
                            position_id = %dropped.position_id,
                            "pending queue exceeded high-water mark, dropping oldest"
                        );
                    }
                }
            }
        }
    }

    fn spawn_tracker(
        self: &Arc<Self>,
        position: Position,
        meta: TrackedPositionMeta,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let position_id = position.position_id;
        let this = self.clone();
        let execution = self.execution.clone();
        let clock = self.clock.clone();
        let outcome_tx = self.outcome_tx.clone();
        let mut cancel_rx = self.cancel_tx.subscribe();
        let poll_interval = self.config.poll_interval;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            run_tracker(
                position,
                meta,
                execution,
                clock.as_ref(),
                poll_interval,
                &mut cancel_rx,
                &outcome_tx,
            )
            .await;

            this.tracked.lock().await.remove(&position_id);

            // Promote the oldest pending entry, if any, into the slot that
            // just freed up. Its queued snapshot is stale by however long
            // it waited, so refetch before spawning: the new tracker's
            // entry price must reflect the broker's state at promotion,
            // not at detection/registration time.
            let next = this.pending.lock().await.pop_front();
            if let Some((next_position, next_meta)) = next {
                let promoted = match this.execution.list_positions().await {
                    Ok(positions) => positions
                        .into_iter()
                        .find(|p| p.position_id == next_position.position_id)
                        .unwrap_or(next_position),
                    Err(e) => {
                        warn!(
                            position_id = %next_position.position_id,
                            error = %e,
                            "failed to refresh promoted position, using queued snapshot"
                        );
                        next_position
                    }
                };
                this.admit_or_enqueue(promoted, next_meta).await;
            }
        });

        // Fire-and-forget bookkeeping only; shutdown() best-effort joins
        // via the tracked/pending state draining to empty, not via these
        // handles directly.
        if let Ok(mut guard) = self.tracker_handles.try_lock() {
            guard.push(handle);
        }
    }

    /// Signal the detector and every tracker to stop; trackers finalize
    /// in-flight PnL with the last observed price and exit reason
    /// `Shutdown`. Waits up to `shutdown_grace` before giving up on
    /// stragglers.
    pub async fn shutdown(&self) {
        let _ = self.cancel_tx.send(true);

        if let Some(handle) = self.detector_handle.lock().await.take() {
            let _ = tokio::time::timeout(self.config.shutdown_grace, handle).await;
        }

        let handles: Vec<JoinHandle<()>> = self.tracker_handles.lock().await.drain(..).collect();
        let grace = self.config.shutdown_grace;
        let _ = tokio::time::timeout(grace, futures::future::join_all(handles)).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_tracker(
    entry_snapshot: Position,
    meta: TrackedPositionMeta,
    execution: Arc<dyn ExecutionPort>,
    _clock: &dyn Clock,
    poll_interval: std::time::Duration,
    cancel_rx: &mut watch::Receiver<bool>,
    outcome_tx: &mpsc::UnboundedSender<TradeOutcome>,
) {
    let position_id = entry_snapshot.position_id;
    let entry_price = entry_snapshot.entry_price;
    let entry_ts = entry_snapshot.entry_timestamp;
    let side = entry_snapshot.side;
    let size = entry_snapshot.size;

    let mut peak_pnl = Decimal::ZERO;
    let mut max_drawdown = Decimal::ZERO;
    let mut last_known = entry_snapshot.clone();
    let mut hit_stop_loss = false;
    let mut hit_take_profit = false;
    let mut hit_liquidation = false;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = cancel_rx.changed() => {
                emit_outcome(
                    outcome_tx,
                    &meta,
                    &last_known.instrument,
                    side,
                    entry_price,
                    entry_ts,
                    last_known.entry_price,
                    peak_pnl,
                    max_drawdown,
                    ExitReason::Shutdown,
                );
                return;
            }
        }

        match execution.list_positions().await {
            Ok(positions) => {
                match positions.into_iter().find(|p| p.position_id == position_id) {
                    Some(current) => {
                        // The execution port has no dedicated mark-price
                        // field on `Position`; adapters are expected to
                        // refresh `entry_price` on each poll to reflect
                        // the latest broker-reported reference price.
                        let current_price = current.entry_price;
                        let pnl = match side {
                            Side::Long => (current_price - entry_price) * size,
                            Side::Short => (entry_price - current_price) * size,
                        };
                        if pnl > peak_pnl {
                            peak_pnl = pnl;
                        }
                        let drawdown = peak_pnl - pnl;
                        if drawdown > max_drawdown {
                            max_drawdown = drawdown;
                        }

                        if let Some(stop) = current.stop_loss_price {
                            hit_stop_loss = match side {
                                Side::Long => current_price <= stop,
                                Side::Short => current_price >= stop,
                            };
                        }
                        if let Some(target) = current.take_profit_price {
                            hit_take_profit = match side {
                                Side::Long => current_price >= target,
                                Side::Short => current_price <= target,
                            };
                        }
                        if let Some(liquidation) = current.liquidation_price {
                            hit_liquidation = match side {
                                Side::Long => current_price <= liquidation,
                                Side::Short => current_price >= liquidation,
                            };
                        }

                        last_known = current;

                        if hit_liquidation || hit_stop_loss || hit_take_profit {
                            let reason = if hit_liquidation {
                                ExitReason::Liquidation
                            } else if hit_stop_loss {
                                ExitReason::StopLoss
                            } else {
                                ExitReason::TakeProfit
                            };
                            emit_outcome(
                                outcome_tx,
                                &meta,
                                &last_known.instrument,
                                side,
                                entry_price,
                                entry_ts,
                                last_known.entry_price,
                                peak_pnl,
                                max_drawdown,
                                reason,
                            );
                            return;
                        }
                    }
                    None => {
                        // Position vanished from the platform's open set.
                        let reason = if hit_liquidation {
                            ExitReason::Liquidation
                        } else if hit_stop_loss {
                            ExitReason::StopLoss
                        } else if hit_take_profit {
                            ExitReason::TakeProfit
                        } else {
                            ExitReason::Manual
                        };
                        emit_outcome(
                            outcome_tx,
                            &meta,
                            &last_known.instrument,
                            side,
                            entry_price,
                            entry_ts,
                            last_known.entry_price,
                            peak_pnl,
                            max_drawdown,
                            reason,
                        );
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(position_id = %position_id, error = %e, "tracker poll failed, retrying next interval");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_outcome(
    outcome_tx: &mpsc::UnboundedSender<TradeOutcome>,
    meta: &TrackedPositionMeta,
    instrument: &crate::domain::instrument::Instrument,
    side: Side,
    entry_price: Decimal,
    entry_ts: chrono::DateTime<Utc>,
    exit_price: Decimal,
    peak_pnl: Decimal,
    max_drawdown: Decimal,
    exit_reason: ExitReason,
) {
    let exit_ts = Utc::now();
    let holding_hours = (exit_ts - entry_ts).num_seconds() as f64 / 3600.0;
    let realized_pnl = match side {
        Side::Long => exit_price - entry_price,
        Side::Short => entry_price - exit_price,
    };
    let realized_pnl_pct = if entry_price.is_zero() {
        0.0
    } else {
        (realized_pnl / entry_price).to_f64().unwrap_or(0.0)
    };

    let outcome = TradeOutcome {
        decision_id: meta.decision_id,
        instrument: instrument.clone(),
        side,
        entry_price,
        entry_ts,
        exit_price,
        exit_ts,
        holding_hours,
        realized_pnl,
        realized_pnl_pct,
        ai_provider: meta.ai_provider.clone(),
        ensemble_providers: meta.ensemble_providers.clone(),
        decision_confidence: meta.decision_confidence,
        hit_stop_loss: exit_reason == ExitReason::StopLoss,
        hit_take_profit: exit_reason == ExitReason::TakeProfit,
        peak_pnl,
        max_drawdown,
        market_regime_at_entry: meta.market_regime_at_entry,
        exit_reason,
    };

    let _ = outcome_tx.send(outcome);
}
