//! Retry strategies.
//!
//! A validator that wants another attempt returns a [`RetryStrategy`]
//! describing how the retry should be scheduled. The executor computes the
//! actual delay from the strategy and the number of retries used so far.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::request::Request;
use crate::response::Response;

/// Callback invoked with the alternate request's response to mutate the
/// original request before it is retried.
pub type AltResponseHook = Arc<dyn Fn(&mut Request, &Response) + Send + Sync>;

/// How a retry should be scheduled.
#[derive(Clone)]
pub enum RetryStrategy {
    /// Retry with no delay.
    Immediate,
    /// Retry after a fixed delay.
    Delayed(Duration),
    /// Exponential backoff: `min(cap, base * 2^(attempt - 1))`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound on any single delay.
        cap: Duration,
    },
    /// Fibonacci backoff: `min(cap, fib(attempt))` seconds.
    Fibonacci {
        /// Upper bound on any single delay.
        cap: Duration,
    },
    /// Execute `request` first (with its own independent retry budget),
    /// hand its response to `on_response` to mutate the original request,
    /// then retry after `delay`.
    After {
        /// The alternate request.
        request: Box<Request>,
        /// Delay applied after the alternate request completes.
        delay: Duration,
        /// Mutates the original request from the alternate response.
        on_response: Option<AltResponseHook>,
    },
}

impl fmt::Debug for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryStrategy::Immediate => write!(f, "Immediate"),
            RetryStrategy::Delayed(delay) => f.debug_tuple("Delayed").field(delay).finish(),
            RetryStrategy::Exponential { base, cap } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("cap", cap)
                .finish(),
            RetryStrategy::Fibonacci { cap } => {
                f.debug_struct("Fibonacci").field("cap", cap).finish()
            }
            RetryStrategy::After { delay, .. } => f
                .debug_struct("After")
                .field("delay", delay)
                .finish_non_exhaustive(),
        }
    }
}

impl RetryStrategy {
    /// The delay to apply before retry number `attempt` (1-based).
    ///
    /// `After` contributes its fixed delay; the alternate request itself
    /// is executed by the orchestrator, not here.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::Delayed(delay) => *delay,
            RetryStrategy::Exponential { base, cap } => {
                let factor = 2f64.powi(attempt as i32 - 1);
                let delay = base.mul_f64(factor);
                delay.min(*cap)
            }
            RetryStrategy::Fibonacci { cap } => {
                Duration::from_secs(fibonacci(attempt)).min(*cap)
            }
            RetryStrategy::After { delay, .. } => *delay,
        }
    }
}

/// `fib(1) = 1, fib(2) = 1, fib(n) = fib(n-1) + fib(n-2)`, saturating.
fn fibonacci(n: u32) -> u64 {
    let (mut previous, mut current) = (0u64, 1u64);
    for _ in 1..n {
        let next = previous.saturating_add(current);
        previous = current;
        current = next;
    }
    current
}
