use agent_core::config::CircuitBreakerConfig;
use agent_core::{CircuitBreaker, CircuitBreakerError};
use std::time::Duration;

fn config(failure_threshold: usize, recovery_timeout: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        recovery_timeout,
    }
}

async fn failing_call() -> Result<(), &'static str> {
    Err("execution port unreachable")
}

#[tokio::test]
async fn three_consecutive_failures_open_the_breaker() {
    let breaker = CircuitBreaker::new("execution".into(), config(3, Duration::from_millis(200)));

    for _ in 0..3 {
        let result = breaker.call(failing_call).await;
        assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
    }

    let result = breaker.call(failing_call).await;
    assert!(matches!(result, Err(CircuitBreakerError::Open(_))));
}

#[tokio::test]
async fn open_breaker_rejects_without_invoking_the_wrapped_call() {
    let breaker = CircuitBreaker::new("execution".into(), config(3, Duration::from_millis(200)));
    for _ in 0..3 {
        let _ = breaker.call(failing_call).await;
    }

    let invoked = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let invoked_clone = invoked.clone();
    let result = breaker
        .call(move || {
            let invoked = invoked_clone.clone();
            async move {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<(), &'static str>(())
            }
        })
        .await;

    assert!(matches!(result, Err(CircuitBreakerError::Open(_))));
    assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn after_recovery_timeout_one_probe_is_admitted_and_success_closes() {
    let recovery_timeout = Duration::from_millis(100);
    let breaker = CircuitBreaker::new("execution".into(), config(3, recovery_timeout));
    for _ in 0..3 {
        let _ = breaker.call(failing_call).await;
    }

    tokio::time::sleep(recovery_timeout + Duration::from_millis(50)).await;

    let result = breaker.call(|| async { Ok::<(), &'static str>(()) }).await;
    assert!(result.is_ok());

    // Breaker closed and failure count reset: three more failures are
    // needed again before it reopens.
    for _ in 0..2 {
        let result = breaker.call(failing_call).await;
        assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
    }
    let result = breaker.call(failing_call).await;
    assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
    let result = breaker.call(failing_call).await;
    assert!(matches!(result, Err(CircuitBreakerError::Open(_))));
}
