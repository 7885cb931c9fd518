use crate::{
    error::{ApiError, ErrorKind},
    exchange::VenueId,
    ledger::{ErrorLedger, Operation, OperationOutcome},
};
use rand::Rng;
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

/// Default maximum attempts of a single upstream call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// [`ErrorKind::AccessDenied`] is retried once at most.
const ACCESS_DENIED_MAX_ATTEMPTS: u32 = 2;

/// Exponential backoff with jitter applied to a single upstream call.
///
/// The delay before retry `n` (1-based) is `base_delay * growth_factor^(n-1)`, multiplied by
/// `rate_limit_multiplier` when the previous attempt was rate limited, capped at `max_delay`,
/// plus a uniformly random jitter in `0..=max_jitter`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub growth_factor: f64,
    pub max_jitter: Duration,
    pub rate_limit_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            growth_factor: 2.0,
            max_jitter: Duration::from_millis(500),
            rate_limit_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Widen the schedule for sandboxed / shared cloud networks, where upstream rate limits are
    /// hit far sooner.
    pub fn constrained(self) -> Self {
        Self {
            base_delay: self.base_delay * 2,
            growth_factor: 3.0,
            max_jitter: Duration::from_secs(1),
            ..self
        }
    }

    /// Policy that never sleeps, used where upstream calls are scripted.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = growth_factor.max(1.0);
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Determine if another attempt should follow `attempt` (1-based) failing with `kind`.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }

        match kind {
            ErrorKind::TransientNetwork | ErrorKind::RateLimited => true,
            ErrorKind::AccessDenied => attempt < ACCESS_DENIED_MAX_ATTEMPTS,
            ErrorKind::Rejected | ErrorKind::MalformedResponse | ErrorKind::UnsupportedAsset => {
                false
            }
        }
    }

    /// Deterministic part of the delay following a failed `attempt` (1-based).
    pub fn backoff(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let mut secs = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);

        if kind == ErrorKind::RateLimited {
            secs *= self.rate_limit_multiplier;
        }

        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Full delay following a failed `attempt`, including random jitter.
    pub fn delay_for(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = self.max_jitter.as_millis() as u64;
            Duration::from_millis(rand::rng().random_range(0..=max))
        };

        self.backoff(attempt, kind) + jitter
    }

    /// Drive `operation` until it succeeds, the error is not retryable, or attempts run out.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<Success<T>, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    return Ok(Success {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    let kind = error.kind();
                    if !self.should_retry(kind, attempt) {
                        return Err(RetryFailure {
                            attempts: attempt,
                            error,
                        });
                    }

                    let delay = self.delay_for(attempt, kind);
                    debug!(attempt, %kind, ?delay, %error, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Successful value of [`RetryPolicy::execute`] with the attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Success<T> {
    pub value: T,
    pub attempts: u32,
}

/// Terminal error of [`RetryPolicy::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: ApiError,
}

/// Terminal result of a [`ResilientOperation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Completed(T),
    /// The venue does not list the asset. Nothing was ledgered.
    Unsupported,
    /// Retries ended on a failure, which was ledgered.
    Failed(RetryFailure),
}

impl<T> Attempt<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Unsupported | Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A single upstream call on one venue, retried under a [`RetryPolicy`] and ledgered.
///
/// Only the terminal outcome is recorded. An [`ErrorKind::UnsupportedAsset`] failure is not an
/// error: nothing is recorded and [`Attempt::Unsupported`] is returned.
#[derive(Debug, Copy, Clone)]
pub struct ResilientOperation<'a> {
    policy: &'a RetryPolicy,
    venue: VenueId,
    operation: Operation,
}

impl<'a> ResilientOperation<'a> {
    pub fn new(policy: &'a RetryPolicy, venue: VenueId, operation: Operation) -> Self {
        Self {
            policy,
            venue,
            operation,
        }
    }

    /// Run `call` to a terminal [`Attempt`], ledgering it unless the asset is unsupported.
    pub async fn attempt<T, F, Fut>(&self, ledger: &mut ErrorLedger, call: F) -> Attempt<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match self.policy.execute(call).await {
            Ok(Success { value, attempts }) => {
                ledger.record(OperationOutcome::success(
                    self.venue,
                    self.operation,
                    attempts,
                ));
                Attempt::Completed(value)
            }
            Err(RetryFailure { error, .. }) if error.kind() == ErrorKind::UnsupportedAsset => {
                debug!(
                    exchange = %self.venue,
                    operation = %self.operation,
                    %error,
                    "asset not supported"
                );
                Attempt::Unsupported
            }
            Err(failure) => {
                warn!(
                    exchange = %self.venue,
                    operation = %self.operation,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "operation failed"
                );
                ledger.record(OperationOutcome::failure(
                    self.venue,
                    self.operation,
                    &failure.error,
                    failure.attempts,
                ));
                Attempt::Failed(failure)
            }
        }
    }

    /// Like [`Self::attempt`], keeping only the value.
    pub async fn run<T, F, Fut>(&self, ledger: &mut ErrorLedger, call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.attempt(ledger, call).await.value()
    }
}
