use agent_core::application::trade_monitor::TrackedPositionMeta;
use agent_core::config::TradeMonitorConfig;
use agent_core::domain::errors::CoreError;
use agent_core::domain::instrument::Instrument;
use agent_core::domain::ports::{AccountInfo, Ack, Clock, ExecutionPort, OrderRequest};
use agent_core::domain::position::{Position, Side};
use agent_core::infrastructure::SystemClock;
use agent_core::TradeMonitor;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

struct ControllableExecution {
    positions: RwLock<Vec<Position>>,
}

impl ControllableExecution {
    fn new(positions: Vec<Position>) -> Self {
        Self { positions: RwLock::new(positions) }
    }

    async fn close(&self, position_id: Uuid) {
        self.positions.write().await.retain(|p| p.position_id != position_id);
    }

    async fn reprice(&self, position_id: Uuid, entry_price: Decimal) {
        for p in self.positions.write().await.iter_mut() {
            if p.position_id == position_id {
                p.entry_price = entry_price;
            }
        }
    }
}

#[async_trait]
impl ExecutionPort for ControllableExecution {
    async fn submit(&self, _order: OrderRequest) -> Result<Ack, CoreError> {
        unreachable!("this test never submits new orders")
    }
    async fn list_positions(&self) -> Result<Vec<Position>, CoreError> {
        Ok(self.positions.read().await.clone())
    }
    async fn account_info(&self) -> Result<AccountInfo, CoreError> {
        Ok(AccountInfo {
            balance: dec!(10_000),
            max_leverage: 1.0,
            maintenance_margin: dec!(0),
        })
    }
}

fn position(symbol: &str, entry_price: Decimal) -> Position {
    Position {
        position_id: Uuid::new_v4(),
        instrument: Instrument::new(symbol, "crypto"),
        side: Side::Long,
        size: dec!(1),
        entry_price,
        entry_timestamp: Utc::now(),
        stop_loss_price: None,
        take_profit_price: None,
        liquidation_price: None,
    }
}

#[tokio::test]
async fn third_registration_queues_until_a_tracker_slot_frees() {
    let a = position("AAA/USD", dec!(100));
    let b = position("BBB/USD", dec!(100));
    let c = position("CCC/USD", dec!(100));
    let a_id = a.position_id;
    let c_id = c.position_id;

    let execution = Arc::new(ControllableExecution::new(vec![a.clone(), b.clone(), c.clone()]));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let config = TradeMonitorConfig {
        max_concurrent_trackers: 2,
        detection_interval: Duration::from_secs(3600),
        poll_interval: Duration::from_millis(30),
        pending_high_water_mark: 10,
        shutdown_grace: Duration::from_secs(2),
    };

    let (monitor, mut outcome_rx) = TradeMonitor::new(config, execution.clone(), clock);
    let monitor = Arc::new(monitor);

    monitor.register(a.clone(), TrackedPositionMeta::synthesized()).await;
    monitor.register(b.clone(), TrackedPositionMeta::synthesized()).await;
    monitor.register(c.clone(), TrackedPositionMeta::synthesized()).await;

    assert_eq!(monitor.tracked_count().await, 2);
    assert_eq!(monitor.pending_count().await, 1);

    // While C is still queued, the broker reports a new reference price
    // for it. Promotion must pick this up instead of the stale price
    // captured when C was registered.
    execution.reprice(c_id, dec!(150)).await;

    // Closing A lets its tracker observe the vanished position, emit an
    // outcome, free its semaphore permit, and promote C from pending.
    execution.close(a_id).await;
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if monitor.pending_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("pending entry should have been promoted after a tracker slot freed");

    assert_eq!(monitor.tracked_count().await, 2);
    assert_eq!(monitor.pending_count().await, 0);

    // Close C right away so its tracker finalizes immediately. If
    // promotion had reused the stale snapshot captured at registration,
    // this outcome's entry price would read 100, not 150. A's own
    // vanish-outcome is already on this channel ahead of C's, so scan
    // past it rather than assume C's is first.
    execution.close(c_id).await;
    let outcome = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let outcome = outcome_rx.recv().await.expect("outcome channel should still be open");
            if outcome.instrument.symbol() == "CCCUSD" {
                return outcome;
            }
        }
    })
    .await
    .expect("C's tracker should finalize shortly after closing");
    assert_eq!(outcome.entry_price, dec!(150));

    monitor.shutdown().await;
}
