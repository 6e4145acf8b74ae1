// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Server-driven rate limiting for DNS directory requests.
//!
//! The directory answers HTTP 429 with `Date` and `Retry-After` headers. The wait is
//! computed as `Retry-After - Date`, both taken from the server, so local clock skew
//! does not matter. Until the wait has elapsed every request of the same class fails
//! fast with the cached error and never reaches the network.
//!
//! Authenticated (bearer token) and unauthenticated (domain reservation) requests are
//! throttled independently.

use crate::dns_errors::DirectoryError;
use crate::metrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, DATE, RETRY_AFTER};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Class of outbound request, throttled independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Requests carrying a bearer token
    Authenticated,
    /// Requests without a token (domain reservation)
    Unauthenticated,
}

impl RequestClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

#[derive(Debug, Default)]
struct LimitState {
    until: Option<Instant>,
    error: Option<DirectoryError>,
    generation: u64,
}

impl LimitState {
    fn clear(&mut self) {
        self.until = None;
        self.error = None;
    }
}

/// Shared throttling state. Cloning shares the underlying state.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    authenticated: Arc<Mutex<LimitState>>,
    unauthenticated: Arc<Mutex<LimitState>>,
}

impl RateLimiter {
    /// Create a limiter with no active limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, class: RequestClass) -> &Arc<Mutex<LimitState>> {
        match class {
            RequestClass::Authenticated => &self.authenticated,
            RequestClass::Unauthenticated => &self.unauthenticated,
        }
    }

    /// Fail fast if `class` is currently throttled.
    ///
    /// # Errors
    ///
    /// Returns the cached [`DirectoryError::RateLimited`] while the limit is active.
    pub fn check(&self, class: RequestClass) -> Result<(), DirectoryError> {
        let mut state = self.slot(class).lock();
        if let Some(until) = state.until {
            // The clear task may not have run yet once the deadline passes.
            if Instant::now() >= until {
                state.clear();
                return Ok(());
            }
        }
        match &state.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// True if `class` is currently throttled.
    #[must_use]
    pub fn is_limited(&self, class: RequestClass) -> bool {
        self.check(class).is_err()
    }

    /// Record an HTTP 429 for `class` and return the error to surface.
    ///
    /// When both headers parse, the class is throttled until `Retry-After` and a one-shot
    /// timer clears the limit. Otherwise [`DirectoryError::RateLimitedUnknownResume`] is
    /// returned and no limit is recorded.
    pub fn record_rate_limited(&self, class: RequestClass, headers: &HeaderMap) -> DirectoryError {
        metrics::record_rate_limit_hit(class.as_str());

        let (resume_at, wait) = match resume_time(headers) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(class = class.as_str(), %reason, "Rate limited with unknown resume time");
                return DirectoryError::RateLimitedUnknownResume { reason };
            }
        };

        let err = DirectoryError::RateLimited { resume_at };
        let slot = Arc::clone(self.slot(class));
        let generation = {
            let mut state = slot.lock();
            state.generation += 1;
            state.until = Some(Instant::now() + wait);
            state.error = Some(err.clone());
            state.generation
        };
        warn!(
            class = class.as_str(),
            %resume_at,
            wait_secs = wait.as_secs(),
            "DNS directory rate limit engaged"
        );

        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let mut state = slot.lock();
            if state.generation == generation {
                state.clear();
                debug!(class = class.as_str(), "DNS directory rate limit cleared");
            }
        });

        err
    }
}

/// Parse `Date` and `Retry-After` into the resume time and the wait before it.
///
/// `Retry-After` may also be a number of seconds, in which case the resume time is
/// relative to `Date`.
fn resume_time(headers: &HeaderMap) -> Result<(DateTime<Utc>, Duration), String> {
    let date = header_str(headers, DATE.as_str())?;
    let date = DateTime::parse_from_rfc2822(date)
        .map_err(|e| format!("invalid Date header '{date}': {e}"))?
        .with_timezone(&Utc);

    let retry_after = header_str(headers, RETRY_AFTER.as_str())?;
    let resume_at = if let Ok(secs) = retry_after.trim().parse::<u64>() {
        let secs = i64::try_from(secs).map_err(|e| format!("invalid Retry-After: {e}"))?;
        date + chrono::Duration::seconds(secs)
    } else {
        DateTime::parse_from_rfc2822(retry_after)
            .map_err(|e| format!("invalid Retry-After header '{retry_after}': {e}"))?
            .with_timezone(&Utc)
    };

    let wait = (resume_at - date).to_std().unwrap_or(Duration::ZERO);
    Ok((resume_at, wait))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, String> {
    headers
        .get(name)
        .ok_or_else(|| format!("missing {name} header"))?
        .to_str()
        .map_err(|e| format!("unreadable {name} header: {e}"))
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod rate_limit_tests;
