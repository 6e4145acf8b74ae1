// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff.
//!
//! Both retry drivers share one [`Backoff`] policy:
//!
//! - [`retry_api_call`] retries transient Kubernetes API errors (429, 5xx, connection
//!   failures) with jittered delays under an overall deadline, and fails fast on
//!   permanent 4xx errors so compare-and-update callers see conflicts immediately.
//! - [`retry_with_backoff`] drives a condition function through a fixed number of
//!   attempts. The DNS sync daemon uses it for each renew-and-sync cycle.

use crate::constants::{
    DAEMON_BACKOFF_CAP_SECS, DAEMON_BACKOFF_FACTOR, DAEMON_BACKOFF_INITIAL_SECS,
    DAEMON_BACKOFF_STEPS,
};
use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Overall deadline for retrying a single Kubernetes API call
pub const API_RETRY_DEADLINE: Duration = Duration::from_secs(300);

/// Capped exponential backoff with a fixed number of attempts.
///
/// The delay before attempt `n + 1` is `initial * factor^(n - 1)`, never more than `cap`,
/// then spread by `±jitter` of itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt
    pub initial: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub factor: f64,
    /// Total number of attempts
    pub steps: u32,
    /// Upper bound on any single delay, before jitter
    pub cap: Duration,
    /// Randomization factor, e.g. `0.1` for ±10%
    pub jitter: f64,
}

impl Default for Backoff {
    /// Daemon policy: 1s initial, factor 2, 10 attempts, 300s cap, no jitter.
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(DAEMON_BACKOFF_INITIAL_SECS),
            factor: DAEMON_BACKOFF_FACTOR,
            steps: DAEMON_BACKOFF_STEPS,
            cap: Duration::from_secs(DAEMON_BACKOFF_CAP_SECS),
            jitter: 0.0,
        }
    }
}

impl Backoff {
    /// Kubernetes API policy: 100ms initial, factor 2, 30s cap, ±10% jitter.
    ///
    /// Attempts are bounded by [`API_RETRY_DEADLINE`] rather than a step count.
    #[must_use]
    pub fn api() -> Self {
        Self {
            initial: Duration::from_millis(100),
            factor: 2.0,
            steps: u32::MAX,
            cap: Duration::from_secs(30),
            jitter: 0.1,
        }
    }

    /// Un-jittered delay slept after failed attempt `attempt` (1-based), or `None` once
    /// every step has been used.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.steps {
            return None;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.factor.powi(exponent);
        let cap = self.cap.as_secs_f64();
        Some(Duration::from_secs_f64(if secs.is_finite() { secs.min(cap) } else { cap }))
    }

    /// Delays slept between attempts, in order (`steps - 1` entries).
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.steps).map_while(|attempt| self.delay(attempt)).collect()
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter == 0.0 {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let spread = secs * self.jitter;
        Duration::from_secs_f64((secs - spread + rand::random::<f64>() * 2.0 * spread).max(0.0))
    }
}

/// Retry a Kubernetes API call with [`Backoff::api`].
///
/// # Errors
///
/// Returns the original `kube::Error` (so callers can downcast it) when the error is
/// not retryable, or an error naming the attempt count once [`API_RETRY_DEADLINE`]
/// has passed.
///
/// # Example
///
/// ```no_run
/// use kube::{Api, Client};
/// use k8s_openapi::api::core::v1::Secret;
/// use clusterdomain::reconcilers::retry::retry_api_call;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let api: Api<Secret> = Api::namespaced(client, "acorn-system");
///
/// let secret = retry_api_call(
///     || async { api.get_opt("clusterdomain-dns").await },
///     "get secret clusterdomain-dns"
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let backoff = Backoff::api();
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let e = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt,
                        elapsed = ?start.elapsed(),
                        "Kubernetes API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_retryable_error(&e) {
            // Conflicts and not-found are routine for compare-and-update callers
            debug!(operation = operation_name, error = %e, "Non-retryable Kubernetes API error");
            return Err(e.into());
        }

        let delay = backoff.delay(attempt).map(|d| backoff.jittered(d));
        match delay {
            Some(delay) if start.elapsed() + delay < API_RETRY_DEADLINE => {
                warn!(
                    operation = operation_name,
                    attempt,
                    retry_after = ?delay,
                    error = %e,
                    "Retryable Kubernetes API error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            _ => {
                error!(
                    operation = operation_name,
                    attempt,
                    elapsed = ?start.elapsed(),
                    error = %e,
                    "Kubernetes API retries exhausted, giving up"
                );
                return Err(anyhow::anyhow!(
                    "{operation_name} failed after {attempt} attempts: {e}"
                ));
            }
        }
    }
}

/// Transient Kubernetes errors: HTTP 429, 5xx, and transport failures.
fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => api_err.code == 429 || (500..600).contains(&api_err.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Why [`retry_with_backoff`] stopped without the condition succeeding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    /// Every attempt reported "not done"
    #[error("condition not met after {attempts} attempts")]
    Exhausted {
        /// Number of attempts made
        attempts: u32,
    },

    /// The cancellation token fired before the condition succeeded
    #[error("retry cancelled")]
    Cancelled,
}

/// Run `condition` until it returns `true`, sleeping per `backoff` between attempts.
///
/// # Errors
///
/// Returns [`BackoffError::Exhausted`] after `backoff.steps` unsuccessful attempts, or
/// [`BackoffError::Cancelled`] as soon as `cancel` fires.
pub async fn retry_with_backoff<F, Fut>(
    backoff: Backoff,
    cancel: &CancellationToken,
    mut condition: F,
) -> Result<(), BackoffError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(BackoffError::Cancelled);
        }
        attempt += 1;
        if condition().await {
            return Ok(());
        }

        let Some(delay) = backoff.delay(attempt).map(|d| backoff.jittered(d)) else {
            return Err(BackoffError::Exhausted { attempts: attempt });
        };
        debug!(attempt, retry_after = ?delay, "Condition not met, backing off");
        tokio::select! {
            () = cancel.cancelled() => return Err(BackoffError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
