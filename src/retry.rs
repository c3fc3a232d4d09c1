//! Bounded fixed-delay retry
//!
//! `RetryPolicy::run` calls an async operation up to `max_attempts` times,
//! sleeping `delay` after every failed attempt except the last. It knows
//! nothing about polling schedules; the caller decides what happens after
//! the attempts are used up. `run_until_some` also spends attempts on empty
//! answers, without sleeping after them.

use log::{debug, error, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts per fetch
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// How an operation may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Flat pause after each failed attempt
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Result of running an operation under a `RetryPolicy`
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T, E> {
    /// An attempt returned `Ok`; `attempts` counts the successful one
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32, last_error: E },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Classifies errors for logging; every kind is retried the same way
pub trait Transient {
    /// Whether the error is a network hiccup worth only a warning
    fn is_transient(&self) -> bool;
}

impl Transient for crate::error::SourceError {
    fn is_transient(&self) -> bool {
        self.is_transport()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempts are used up
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        E: Display + Transient,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Attempt {}/{}", attempt, max_attempts);

            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                    } else {
                        error!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                    }

                    if attempt >= max_attempts {
                        return RetryOutcome::Exhausted {
                            attempts: attempt,
                            last_error: e,
                        };
                    }

                    debug!("Retrying in {:?}", self.delay);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run `op` until it yields a value or the attempts are used up
    ///
    /// An `Ok(None)` answer uses up an attempt like an error does, but the
    /// next attempt follows at once. Errors still wait `delay`. On
    /// exhaustion `last_error` is `None` when the final attempt was empty.
    pub async fn run_until_some<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T, Option<E>>
    where
        E: Display + Transient,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Attempt {}/{}", attempt, max_attempts);

            let last_error = match op(attempt).await {
                Ok(Some(value)) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Ok(None) => {
                    warn!("Attempt {}/{} returned nothing", attempt, max_attempts);
                    None
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                    } else {
                        error!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                    }
                    Some(e)
                }
            };

            if attempt >= max_attempts {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error,
                };
            }

            if last_error.is_some() {
                debug!("Retrying in {:?}", self.delay);
                tokio::time::sleep(self.delay).await;
            }
            attempt += 1;
        }
    }
}
