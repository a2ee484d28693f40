//! Timeouts, retries and a circuit breaker around collaborator calls.
//!
//! Adapters are synchronous; [`Guarded::call`] runs them on the blocking
//! pool under a per-call timeout, retries transient failures with
//! exponential backoff and fails fast while the breaker is open.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::AdapterError;

/// Retry and timeout settings for one collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1` (attempts start at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// One trial call is let through.
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time spent open before a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Thread-safe consecutive-failure circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// `Err(retry_after)` while calls must be rejected.
    pub fn check(&self) -> Result<(), Duration> {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> Result<(), Duration> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        self.refresh(&mut inner, now);

        let retry_after = inner
            .opened_at
            .map(|t| self.config.reset_timeout.saturating_sub(now.duration_since(t)))
            .unwrap_or(self.config.reset_timeout);
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => Err(retry_after),
            BreakerState::HalfOpen if inner.trial_in_flight => Err(retry_after),
            BreakerState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(())
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.failures += 1;
        inner.trial_in_flight = false;
        if inner.state == BreakerState::HalfOpen || inner.failures >= self.config.failure_threshold {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
        }
    }

    fn refresh(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state == BreakerState::Open {
            if let Some(opened) = inner.opened_at {
                if now.duration_since(opened) >= self.config.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = false;
                }
            }
        }
    }
}

/// A collaborator behind timeout, retry and circuit breaker.
pub struct Guarded<A: ?Sized> {
    inner: Arc<A>,
    service: String,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl<A: ?Sized + Send + Sync + 'static> Guarded<A> {
    pub fn new(inner: Arc<A>, service: impl Into<String>, policy: RetryPolicy, breaker: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            service: service.into(),
            policy,
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn inner(&self) -> &Arc<A> {
        &self.inner
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Run `f` against the collaborator with the resilience policy applied.
    ///
    /// Non-retryable errors are returned as they are; retryable ones are
    /// wrapped in [`AdapterError::RetriesExhausted`] once attempts run out.
    pub async fn call<T, F>(&self, operation: &str, f: F) -> Result<T, AdapterError>
    where
        T: Send + 'static,
        F: Fn(&A) -> Result<T, AdapterError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Err(retry_after) = self.breaker.check() {
                return Err(AdapterError::CircuitOpen {
                    service: self.service.clone(),
                    retry_after_secs: retry_after.as_secs(),
                });
            }

            let error = match self.attempt(operation, Arc::clone(&f)).await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(error) => error,
            };

            // The collaborator answered; only transport-level failures count against it.
            if !error.is_retryable() {
                self.breaker.record_success();
                return Err(error);
            }
            self.breaker.record_failure();
            if attempt >= self.policy.max_attempts {
                warn!(service = %self.service, operation, attempts = attempt, %error, "collaborator call failed");
                return Err(AdapterError::RetriesExhausted {
                    service: self.service.clone(),
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let backoff = self.policy.backoff(attempt);
            debug!(service = %self.service, operation, attempt, ?backoff, %error, "retrying collaborator call");
            tokio::time::sleep(backoff).await;
        }
    }

    async fn attempt<T, F>(&self, operation: &str, f: Arc<F>) -> Result<T, AdapterError>
    where
        T: Send + 'static,
        F: Fn(&A) -> Result<T, AdapterError> + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || f(&*inner));
        match tokio::time::timeout(self.policy.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(AdapterError::Unavailable {
                service: self.service.clone(),
                message: format!("{operation} did not complete: {join}"),
            }),
            Err(_) => Err(AdapterError::Timeout {
                service: self.service.clone(),
                operation: operation.to_string(),
                timeout_secs: self.policy.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn fetch(&self) -> Result<u32, AdapterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AdapterError::Unavailable {
                    service: "flaky".into(),
                    message: "connection reset".into(),
                });
            }
            Ok(call)
        }
    }

    fn make_test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_secs(5),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn guarded(flaky: Flaky, threshold: u32) -> Guarded<Flaky> {
        Guarded::new(
            Arc::new(flaky),
            "flaky",
            make_test_policy(),
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(60),
            },
        )
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(300));
    }

    #[test]
    fn breaker_opens_after_threshold_and_half_opens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(10),
        });
        let now = Instant::now();
        breaker.record_failure_at(now);
        assert!(breaker.check_at(now).is_ok());
        breaker.record_failure_at(now);
        assert!(breaker.check_at(now + Duration::from_secs(1)).is_err());

        let later = now + Duration::from_secs(11);
        assert!(breaker.check_at(later).is_ok());
        assert!(breaker.check_at(later).is_err());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let guarded = guarded(Flaky::new(2), 5);
        let value = guarded.call("fetch", |f: &Flaky| f.fetch()).await.unwrap();
        assert_eq!(value, 3);
        assert_eq!(guarded.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let guarded = guarded(Flaky::new(10), 5);
        let err = guarded.call("fetch", |f: &Flaky| f.fetch()).await.unwrap_err();
        assert!(matches!(err, AdapterError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn open_breaker_fails_fast() {
        let guarded = guarded(Flaky::new(10), 2);
        let _ = guarded.call("fetch", |f: &Flaky| f.fetch()).await;
        let err = guarded.call("fetch", |f: &Flaky| f.fetch()).await.unwrap_err();
        assert!(matches!(err, AdapterError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn non_retryable_errors_pass_through() {
        let guarded = guarded(Flaky::new(0), 5);
        let err = guarded
            .call("lookup", |_: &Flaky| -> Result<(), AdapterError> {
                Err(AdapterError::NotFound {
                    service: "flaky".into(),
                    id: "x".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }
}
