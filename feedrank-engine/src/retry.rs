use feedrank_core::{CircuitBreakerConfig, ErrorExt, FeedError, RetryConfig};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Routing straight to fallback
    HalfOpen, // Letting one trial call through
}

/// Failure-rate circuit breaker over a sliding time window.
///
/// The rate is only trusted once `minimum_calls` outcomes fall inside the
/// window, so a single early failure cannot open it. While half-open, one
/// trial call is admitted at a time; a trial that never reports back is
/// replaced after another `open_duration`.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trial_started_at: Option<Instant>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            outcomes: VecDeque::new(),
            opened_at: None,
            trial_started_at: None,
            config,
        }
    }

    /// Check if a request should be allowed
    pub fn allow_request(&mut self) -> bool {
        self.allow_request_at(Instant::now())
    }

    pub fn allow_request_at(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::HalfOpen => {
                let trial_stale = self
                    .trial_started_at
                    .map_or(true, |started| now.duration_since(started) >= self.config.open_duration());
                if trial_stale {
                    debug!("Circuit breaker admitting a new trial call");
                    self.trial_started_at = Some(now);
                }
                trial_stale
            }
            CircuitBreakerState::Open => {
                let cooled_down = self
                    .opened_at
                    .map_or(true, |opened| now.duration_since(opened) >= self.config.open_duration());
                if cooled_down {
                    debug!("Circuit breaker transitioning to half-open for recovery test");
                    self.state = CircuitBreakerState::HalfOpen;
                    self.trial_started_at = Some(now);
                }
                cooled_down
            }
        }
    }

    /// A call that ended in a caller mistake. The backend answered, so a
    /// half-open trial counts as recovered; otherwise nothing is recorded.
    pub fn record_client_error(&mut self) {
        if self.state == CircuitBreakerState::HalfOpen {
            self.record_at(Instant::now(), true);
        }
    }

    pub fn record_success(&mut self) {
        self.record_at(Instant::now(), true);
    }

    pub fn record_failure(&mut self) {
        self.record_at(Instant::now(), false);
    }

    pub fn record_at(&mut self, now: Instant, success: bool) {
        match self.state {
            CircuitBreakerState::HalfOpen if success => {
                info!("Circuit breaker recovery successful, returning to closed state");
                self.state = CircuitBreakerState::Closed;
                self.opened_at = None;
                self.trial_started_at = None;
                self.outcomes.clear();
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker recovery failed, returning to open state");
                self.trip(now);
            }
            CircuitBreakerState::Closed => {
                self.outcomes.push_back((now, success));
                self.prune(now);
                if let Some(rate) = self.failure_rate() {
                    if rate >= self.config.failure_rate_threshold {
                        warn!(
                            failure_rate = rate,
                            calls = self.outcomes.len(),
                            "Circuit breaker opening"
                        );
                        self.trip(now);
                    }
                }
            }
            // Late outcomes from calls admitted before the breaker opened.
            CircuitBreakerState::Open => {}
        }
    }

    /// Failure rate over the window, or `None` while too few calls are in it.
    pub fn failure_rate(&self) -> Option<f64> {
        let calls = self.outcomes.len();
        if calls == 0 || calls < self.config.minimum_calls {
            return None;
        }
        let failures = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        Some(failures as f64 / calls as f64)
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        self.state
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitBreakerState::Open;
        self.opened_at = Some(now);
        self.trial_started_at = None;
        self.outcomes.clear();
    }

    fn prune(&mut self, now: Instant) {
        let window = self.config.window();
        while let Some(&(at, _)) = self.outcomes.front() {
            if now.duration_since(at) > window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after a delay the error itself suggests
    RetryWithDelay(Duration),
    /// Don't retry (client errors and permanent failures)
    NoRetry,
}

pub fn get_retry_strategy(error: &FeedError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    // Jitter keeps concurrent retries from lining up
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
    pub average_retry_delay_ms: f64,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs an operation under the retry policy. Only retryable errors are
/// retried; the last error is returned unchanged so callers can still tell
/// client errors from data failures.
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, FeedError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, FeedError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut total_delay_ms = 0u64;
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let start_time = Instant::now();
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        let mut metrics = lock(&self.metrics);
                        metrics.total_retries += u64::from(attempt);
                        metrics.successful_retries += 1;
                        metrics.average_retry_delay_ms = (metrics.average_retry_delay_ms
                            * (metrics.successful_retries - 1) as f64
                            + total_delay_ms as f64)
                            / metrics.successful_retries as f64;

                        info!(
                            "Operation {} succeeded after {} retries (total delay: {}ms)",
                            operation_name, attempt, total_delay_ms
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {} failed for {} after {:?}: {}",
                attempt + 1,
                operation_name,
                start_time.elapsed(),
                error
            );

            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    return Err(self.give_up(error, attempt));
                }
                _ if attempt + 1 >= max_attempts => {
                    error!(
                        "Operation {} failed after {} attempts with total delay of {}ms",
                        operation_name, max_attempts, total_delay_ms
                    );
                    return Err(self.give_up(error, attempt));
                }
                RetryStrategy::Retry => calculate_delay(attempt, &self.config),
                RetryStrategy::RetryWithDelay(delay) => delay,
            };

            total_delay_ms += delay.as_millis() as u64;
            info!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
            sleep(delay).await;
            attempt += 1;
        }
    }

    fn give_up(&self, error: FeedError, retries: u32) -> FeedError {
        let mut metrics = lock(&self.metrics);
        metrics.total_retries += u64::from(retries);
        metrics.failed_operations += 1;
        error
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        lock(&self.metrics).clone()
    }

    pub fn reset_metrics(&self) {
        *lock(&self.metrics) = RetryMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedrank_core::DataAccessError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            window_secs: 60,
            minimum_calls: 4,
            open_secs: 30,
        }
    }

    fn unavailable() -> FeedError {
        FeedError::DataAccess(DataAccessError::Unavailable {
            source_name: "posts".to_string(),
        })
    }

    #[test]
    fn test_circuit_breaker_closed_state() {
        let mut breaker = CircuitBreaker::new(breaker_config());

        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);
        assert!(breaker.allow_request());
        assert_eq!(breaker.failure_rate(), None);
    }

    #[test]
    fn test_circuit_breaker_needs_minimum_calls() {
        let mut breaker = CircuitBreaker::new(breaker_config());
        let start = Instant::now();

        for i in 0..3 {
            breaker.record_at(start + Duration::from_secs(i), false);
            assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);
        }

        breaker.record_at(start + Duration::from_secs(3), false);
        assert_eq!(breaker.get_state(), CircuitBreakerState::Open);
        assert!(!breaker.allow_request_at(start + Duration::from_secs(4)));
    }

    #[test]
    fn test_circuit_breaker_failure_rate_threshold() {
        let mut breaker = CircuitBreaker::new(breaker_config());
        let start = Instant::now();

        breaker.record_at(start, true);
        breaker.record_at(start, true);
        breaker.record_at(start, true);
        breaker.record_at(start, false);
        assert_eq!(breaker.failure_rate(), Some(0.25));
        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);

        breaker.record_at(start, false);
        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);

        // 3 of 6 reaches the 0.5 threshold
        breaker.record_at(start, false);
        assert_eq!(breaker.get_state(), CircuitBreakerState::Open);
    }

    #[test]
    fn test_circuit_breaker_window_slides() {
        let mut breaker = CircuitBreaker::new(breaker_config());
        let start = Instant::now();

        for _ in 0..3 {
            breaker.record_at(start, false);
        }
        // The old failures have left the window by now.
        let later = start + Duration::from_secs(61);
        breaker.record_at(later, false);
        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.failure_rate(), None);
    }

    #[test]
    fn test_circuit_breaker_recovery() {
        let mut breaker = CircuitBreaker::new(breaker_config());
        let start = Instant::now();

        for _ in 0..4 {
            breaker.record_at(start, false);
        }
        assert_eq!(breaker.get_state(), CircuitBreakerState::Open);
        assert!(!breaker.allow_request_at(start + Duration::from_secs(29)));

        assert!(breaker.allow_request_at(start + Duration::from_secs(30)));
        assert_eq!(breaker.get_state(), CircuitBreakerState::HalfOpen);

        breaker.record_at(start + Duration::from_secs(31), true);
        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.failure_rate(), None);
    }

    #[test]
    fn test_circuit_breaker_failed_trial_reopens() {
        let mut breaker = CircuitBreaker::new(breaker_config());
        let start = Instant::now();

        for _ in 0..4 {
            breaker.record_at(start, false);
        }
        assert!(breaker.allow_request_at(start + Duration::from_secs(30)));
        breaker.record_at(start + Duration::from_secs(30), false);
        assert_eq!(breaker.get_state(), CircuitBreakerState::Open);
        assert!(!breaker.allow_request_at(start + Duration::from_secs(45)));
        assert!(breaker.allow_request_at(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_half_open_admits_one_trial() {
        let mut breaker = CircuitBreaker::new(breaker_config());
        let start = Instant::now();

        for _ in 0..4 {
            breaker.record_at(start, false);
        }
        let trial = start + Duration::from_secs(30);
        assert!(breaker.allow_request_at(trial));
        assert!(!breaker.allow_request_at(trial + Duration::from_secs(1)));
        assert!(!breaker.allow_request_at(trial + Duration::from_secs(29)));
        assert_eq!(breaker.get_state(), CircuitBreakerState::HalfOpen);

        // The first trial never reported back.
        assert!(breaker.allow_request_at(trial + Duration::from_secs(30)));
        assert!(!breaker.allow_request_at(trial + Duration::from_secs(31)));
    }

    #[test]
    fn test_client_error_trial_closes_circuit() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
            open_secs: 0,
            ..breaker_config()
        });
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert!(breaker.allow_request());
        assert_eq!(breaker.get_state(), CircuitBreakerState::HalfOpen);

        breaker.record_client_error();
        assert_eq!(breaker.get_state(), CircuitBreakerState::Closed);

        // While closed, client errors leave the window untouched.
        breaker.record_client_error();
        assert_eq!(breaker.failure_rate(), None);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        assert_eq!(get_retry_strategy(&unavailable()), RetryStrategy::Retry);
        assert_eq!(
            get_retry_strategy(&FeedError::DataAccess(DataAccessError::DatabaseLocked)),
            RetryStrategy::RetryWithDelay(Duration::from_millis(50))
        );
        assert_eq!(
            get_retry_strategy(&FeedError::invalid_argument("limit", "too big")),
            RetryStrategy::NoRetry
        );
        assert_eq!(
            get_retry_strategy(&FeedError::not_found("user 9")),
            RetryStrategy::NoRetry
        );
        assert_eq!(get_retry_strategy(&FeedError::CircuitOpen), RetryStrategy::NoRetry);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0, // No jitter for predictable test
            ..Default::default()
        };

        assert_eq!(calculate_delay(0, &config), Duration::from_millis(1000));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(2000));
        assert_eq!(calculate_delay(2, &config), Duration::from_millis(4000));
        assert_eq!(calculate_delay(3, &config), Duration::from_millis(8000));

        // Should cap at max_delay_ms
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(10000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.5,
            ..Default::default()
        };

        for _ in 0..20 {
            let delay = calculate_delay(1, &config);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[tokio::test]
    async fn test_retry_executor_success_on_first_attempt() {
        let executor = RetryExecutor::new(RetryConfig::default());

        let result = executor
            .execute("test_operation", || async { Ok::<i32, FeedError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(executor.get_metrics(), RetryMetrics::default());
    }

    #[tokio::test]
    async fn test_retry_executor_success_after_retries() {
        let executor = RetryExecutor::new(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..Default::default()
        });
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(unavailable())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 2);
        assert_eq!(metrics.successful_retries, 1);
    }

    #[tokio::test]
    async fn test_retry_executor_no_retry_on_client_error() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, FeedError>(FeedError::not_found("user 4"))
                }
            })
            .await;

        assert!(matches!(result, Err(FeedError::NotFound { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 0);
        assert_eq!(metrics.failed_operations, 1);
    }

    #[tokio::test]
    async fn test_retry_executor_exhausts_attempts() {
        let executor = RetryExecutor::new(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..Default::default()
        });
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, FeedError>(unavailable())
                }
            })
            .await;

        // The original error comes back, not a stringified wrapper.
        assert!(matches!(
            result,
            Err(FeedError::DataAccess(DataAccessError::Unavailable { .. }))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(executor.get_metrics().total_retries, 2);
        assert_eq!(executor.get_metrics().failed_operations, 1);

        executor.reset_metrics();
        assert_eq!(executor.get_metrics(), RetryMetrics::default());
    }
}
