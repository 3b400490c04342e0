//! Constant-delay retry policy applied explicitly at each network call site.

use std::time::Duration;
use tracing::warn;

/// Default number of caught failures before the final attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay between attempts.
pub const DEFAULT_DELAY_SECS: u64 = 2;

/// Retry configuration: how many failures to absorb and how long to wait after each.
///
/// A run makes at most `max_retries + 1` attempts. The first `max_retries` retryable failures
/// are caught (each followed by a sleep of `delay`); the last attempt is not caught, so its
/// error reaches the caller unchanged. Failures the predicate rejects are returned at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Same delay, different retry budget.
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// Run `op`, retrying failures for which `retry_if` returns true.
    pub fn run<T, E, F, P>(&self, retry_if: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        for attempt in 1..=self.max_retries {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if retry_if(&e) => {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "attempt failed, retrying in {:?}",
                        self.delay
                    );
                    std::thread::sleep(self.delay);
                }
                Err(e) => return Err(e),
            }
        }
        op()
    }
}

/// Predicate that retries every failure.
pub fn any_failure<E>(_: &E) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn no_delay(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::ZERO)
    }

    #[test]
    fn success_on_first_attempt_calls_once() {
        let calls = Cell::new(0);
        let result: Result<u32, Failure> = no_delay(3).run(any_failure, || {
            calls.set(calls.get() + 1);
            Ok(7)
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn persistent_retryable_failure_makes_max_retries_plus_one_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), Failure> = no_delay(3).run(
            |e| *e == Failure::Transient,
            || {
                calls.set(calls.get() + 1);
                Err(Failure::Transient)
            },
        );
        assert_eq!(result, Err(Failure::Transient));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn non_retryable_failure_propagates_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), Failure> = no_delay(5).run(
            |e| *e == Failure::Transient,
            || {
                calls.set(calls.get() + 1);
                Err(Failure::Fatal)
            },
        );
        assert_eq!(result, Err(Failure::Fatal));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recovers_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<&str, Failure> = no_delay(3).run(any_failure, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Failure::Transient)
            } else {
                Ok("done")
            }
        });
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn final_attempt_error_is_not_replaced_by_earlier_ones() {
        let calls = Cell::new(0);
        let result: Result<(), Failure> = no_delay(2).run(
            |e| *e == Failure::Transient,
            || {
                calls.set(calls.get() + 1);
                if calls.get() <= 2 {
                    Err(Failure::Transient)
                } else {
                    Err(Failure::Fatal)
                }
            },
        );
        assert_eq!(result, Err(Failure::Fatal));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let calls = Cell::new(0);
        let result: Result<(), Failure> = no_delay(0).run(any_failure, || {
            calls.set(calls.get() + 1);
            Err(Failure::Transient)
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn default_policy_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.delay, Duration::from_secs(2));
        assert_eq!(p.with_max_retries(2).max_retries, 2);
    }
}
