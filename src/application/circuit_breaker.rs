use crate::config::CircuitBreakerConfig;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker [{0}] is open")]
    Open(String),
    #[error(transparent)]
    Inner(E),
}

struct Inner {
    state: CircuitState,
    failure_count: usize,
    opened_at: Option<Instant>,
    /// Set while the single HALF_OPEN probe is in flight, so concurrent
    /// arrivals are rejected rather than also admitted.
    probe_in_flight: bool,
}

/// One instance guards one outbound dependency (one execution back-end,
/// one provider). State transitions are atomic under `inner`'s lock;
/// process restart always begins CLOSED (state is never persisted).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
            })),
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Execute `f` when the breaker is not OPEN, recording the outcome.
    /// In HALF_OPEN, exactly one concurrent caller is admitted; the rest
    /// see `CircuitBreakerError::Open` without `f` ever running.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admitted = {
            let mut guard = self.inner.lock().await;
            match guard.state {
                CircuitState::Closed => true,
                CircuitState::Open => {
                    let elapsed = guard.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                    if elapsed >= self.config.recovery_timeout {
                        info!(breaker = %self.name, "Open -> HalfOpen (recovery timeout elapsed)");
                        guard.state = CircuitState::HalfOpen;
                        guard.probe_in_flight = true;
                        true
                    } else {
                        false
                    }
                }
                CircuitState::HalfOpen => {
                    if guard.probe_in_flight {
                        false
                    } else {
                        guard.probe_in_flight = true;
                        true
                    }
                }
            }
        };

        if !admitted {
            return Err(CircuitBreakerError::Open(self.name.clone()));
        }

        match f().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn on_success(&self) {
        let mut guard = self.inner.lock().await;
        match guard.state {
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "HalfOpen -> Closed (probe succeeded)");
                guard.state = CircuitState::Closed;
                guard.failure_count = 0;
                guard.probe_in_flight = false;
            }
            CircuitState::Closed => guard.failure_count = 0,
            CircuitState::Open => {
                warn!(breaker = %self.name, "success recorded while Open (unexpected)");
            }
        }
    }

    async fn on_failure(&self) {
        let mut guard = self.inner.lock().await;
        match guard.state {
            CircuitState::Closed => {
                guard.failure_count += 1;
                if guard.failure_count >= self.config.failure_threshold {
                    error!(
                        breaker = %self.name,
                        failures = guard.failure_count,
                        "Closed -> Open"
                    );
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "HalfOpen -> Open (probe failed)");
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
                guard.probe_in_flight = false;
            }
            CircuitState::Open => {
                guard.opened_at = Some(Instant::now());
            }
        }
    }
}
