// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Managed DNS directory error types.
//!
//! This module provides the structured error taxonomy for calls made against the
//! external DNS directory service:
//! - Server-driven rate limiting (with or without a known resume time)
//! - Domain authentication failures that require the token to be reset
//! - Generic authentication, status, transport, and decoding failures
//!
//! Callers usually work with `anyhow::Error`; [`is_domain_auth_error`] and
//! [`is_rate_limited`] inspect the error chain for the conditions that drive
//! recovery decisions.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by the DNS directory client.
#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    /// The directory throttled this class of request (HTTP 429)
    ///
    /// Requests of the same class fail fast with this error until `resume_at` has passed.
    #[error("rate limited by the DNS directory, requests will resume after {resume_at}")]
    RateLimited {
        /// Time at which requests may be attempted again, as reported by the server
        resume_at: DateTime<Utc>,
    },

    /// The directory throttled the request but its `Date`/`Retry-After` headers were unusable
    #[error("rate limited by the DNS directory with unknown resume time: {reason}")]
    RateLimitedUnknownResume {
        /// Why the resume time could not be determined
        reason: String,
    },

    /// The directory no longer recognises the domain the token belongs to
    ///
    /// Callers clear the stored token (keeping the domain) so the next reconcile
    /// reserves a fresh domain.
    #[error("the supplied domain failed authentication")]
    DomainAuth,

    /// HTTP 401 without the "no such domain" marker
    #[error("authentication with the DNS directory failed: {message}")]
    AuthFailed {
        /// Message returned by the directory, if any
        message: String,
    },

    /// Any other non-success HTTP status
    #[error("unexpected HTTP status {status} from DNS directory at {url}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// The request could not be sent or the response could not be read
    #[error("failed to reach DNS directory at {url}: {reason}")]
    Transport {
        /// Request URL
        url: String,
        /// Underlying error
        reason: String,
    },

    /// The response body was not the expected JSON document
    #[error("failed to decode DNS directory response from {url}: {reason}")]
    Decode {
        /// Request URL
        url: String,
        /// Underlying error
        reason: String,
    },
}

impl DirectoryError {
    /// Returns true if the directory rejected the domain or its token.
    #[must_use]
    pub fn is_domain_auth(&self) -> bool {
        matches!(self, Self::DomainAuth)
    }

    /// Returns true if this error means the request was throttled.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::RateLimitedUnknownResume { .. }
        )
    }
}

/// Returns true if any error in the chain is [`DirectoryError::DomainAuth`].
#[must_use]
pub fn is_domain_auth_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<DirectoryError>(),
            Some(DirectoryError::DomainAuth)
        )
    })
}

/// Returns true if any error in the chain is a rate-limit condition.
#[must_use]
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<DirectoryError>()
            .is_some_and(DirectoryError::is_rate_limited)
    })
}

#[cfg(test)]
#[path = "dns_errors_tests.rs"]
mod dns_errors_tests;
