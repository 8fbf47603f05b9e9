use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use quarry_core::errors::ProviderError;
use quarry_core::llm::{ChatProvider, ChatRequest, ChatResponse};

/// Configuration for the ReliableProvider retry and circuit breaker behavior.
#[derive(Clone, Debug)]
pub struct ReliableConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown: Duration,
}

impl Default for ReliableConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

/// Wraps a ChatProvider with retry logic and circuit breaker.
///
/// - Retries retryable errors with exponential backoff + jitter
/// - Respects `retry_after` hints from rate limit responses
/// - Circuit breaker: N consecutive failures → open → cooldown → half-open → success → closed
#[derive(Debug)]
pub struct ReliableProvider<P: ChatProvider> {
    inner: P,
    config: ReliableConfig,
    circuit_state: Arc<RwLock<CircuitState>>,
    consecutive_failures: Arc<AtomicU32>,
    total_retries: Arc<AtomicU64>,
}

impl<P: ChatProvider> ReliableProvider<P> {
    pub fn new(inner: P, config: ReliableConfig) -> Self {
        Self {
            inner,
            config,
            circuit_state: Arc::new(RwLock::new(CircuitState::Closed)),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            total_retries: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, ReliableConfig::default())
    }

    /// Check if the circuit breaker allows a request through.
    fn check_circuit(&self) -> Result<(), ProviderError> {
        let state = self.circuit_state.read();
        match &*state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open { since } => {
                if since.elapsed() >= self.config.circuit_breaker_cooldown {
                    drop(state);
                    *self.circuit_state.write() = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(ProviderError::ProviderOverloaded)
                }
            }
        }
    }

    /// Record a successful request — reset circuit breaker.
    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = self.circuit_state.write();
        if *state != CircuitState::Closed {
            info!("circuit breaker closed after successful request");
            *state = CircuitState::Closed;
        }
    }

    /// Record a failed request — potentially trip circuit breaker.
    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.circuit_breaker_threshold {
            let mut state = self.circuit_state.write();
            if *state == CircuitState::Closed || *state == CircuitState::HalfOpen {
                warn!(
                    failures = failures,
                    cooldown_secs = self.config.circuit_breaker_cooldown.as_secs(),
                    "circuit breaker opened after {} consecutive failures",
                    failures
                );
                *state = CircuitState::Open {
                    since: Instant::now(),
                };
            }
        }
    }

    /// Calculate delay for a retry attempt using exponential backoff + jitter.
    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        // Respect server-suggested delay if provided
        if let Some(delay) = suggested {
            return delay;
        }

        // Exponential backoff: base * 2^attempt
        let exp_delay = self.config.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let capped = exp_delay.min(self.config.max_delay.as_millis() as f64);

        // Add jitter: delay * (1 ± jitter_factor)
        let jitter_range = capped * self.config.jitter_factor;
        let jitter = (random_u64() % (jitter_range as u64 * 2 + 1)) as f64 - jitter_range;
        let final_ms = (capped + jitter).max(100.0);

        Duration::from_millis(final_ms as u64)
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    pub fn circuit_state_name(&self) -> &'static str {
        match &*self.circuit_state.read() {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Simple non-cryptographic random u64 using thread-local state.
fn random_u64() -> u64 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
        );
    }

    STATE.with(|s| {
        // xorshift64
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        x
    })
}

#[async_trait]
impl<P: ChatProvider> ChatProvider for ReliableProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.check_circuit()?;

        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.inner.complete(request).await {
                Ok(response) => {
                    self.record_success();
                    return Ok(response);
                }
                Err(e) => {
                    if e.is_fatal() || attempt == self.config.max_retries {
                        self.record_failure();
                        return Err(e);
                    }

                    if !e.is_retryable() {
                        self.record_failure();
                        return Err(e);
                    }

                    let delay = self.retry_delay(attempt, e.suggested_delay());
                    self.total_retries.fetch_add(1, Ordering::Relaxed);

                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after error"
                    );

                    last_error = Some(e);
                    tokio::time::sleep(delay).await;

                    // Re-check circuit after sleep
                    self.check_circuit()?;
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::NetworkError("max retries exceeded".into())))
    }
}
