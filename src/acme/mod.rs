// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME certificate lifecycle.
//!
//! - [`account`] - registered CA identity, persisted and versioned by a settings hash
//! - [`authority`] - the certificate authority seam and its instant-acme implementation
//! - [`certs`] - certificate parsing, renewal policy, and secret layout
//! - [`challenge`] - DNS-01 bridge to the directory and the HTTP-01 responder
//! - [`manager`] - orchestration, in-flight deduplication, and persistence

pub mod account;
pub mod authority;
pub mod certs;
pub mod challenge;
pub mod manager;

pub use account::{AccountSettings, AcmeAccount};
pub use authority::{AcmeAuthority, CertificateAuthority, IssuedCertificate};
pub use challenge::{ChallengeKind, ChallengeRequest, ChallengeSolver, Dns01Bridge, Http01Responder};
pub use manager::{CertificateManager, CertificateManagerSettings, InFlightRequests};

use crate::dns_errors::DirectoryError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while registering accounts or obtaining certificates.
#[derive(Error, Debug)]
pub enum AcmeError {
    /// Operator configuration prevents issuance (e.g. production CA without an email)
    #[error("invalid ACME configuration: {0}")]
    Configuration(String),

    /// Another reconcile is already issuing a certificate for this domain.
    ///
    /// Not a failure: the caller should requeue and try again later.
    #[error("certificate request in progress for {domain}")]
    IssuanceInProgress {
        /// Domain being issued
        domain: String,
    },

    #[error("failed to register ACME account: {0}")]
    AccountCreation(String),

    #[error("failed to create ACME order: {0}")]
    OrderCreation(String),

    /// The CA did not validate the challenge, or offered none we can solve
    #[error("challenge validation failed for {domain}: {reason}")]
    ChallengeValidation {
        /// Identifier under validation
        domain: String,
        /// Failure detail
        reason: String,
    },

    #[error("failed to finalize ACME order: {0}")]
    Finalization(String),

    #[error("ACME protocol error: {0}")]
    Protocol(#[from] instant_acme::Error),

    /// A bounded wait expired
    #[error("timed out after {secs}s {operation}")]
    Timeout {
        /// What was being waited for
        operation: &'static str,
        /// Bound that expired
        secs: u64,
    },

    #[error("certificate request cancelled")]
    Cancelled,

    #[error("failed to parse certificate: {0}")]
    CertificateParse(String),

    #[error("HTTP-01 challenge server failed: {0}")]
    ChallengeServer(#[source] std::io::Error),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode ACME data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AcmeError {
    /// Returns true if this error only signals that issuance is already running.
    #[must_use]
    pub fn is_issuance_in_progress(&self) -> bool {
        matches!(self, Self::IssuanceInProgress { .. })
    }

    /// Returns true if the DNS directory rejected the domain token during a challenge.
    #[must_use]
    pub fn is_domain_auth(&self) -> bool {
        matches!(self, Self::Directory(e) if e.is_domain_auth())
    }
}

/// Returns true if `err` (or any error in its chain) is [`AcmeError::IssuanceInProgress`].
#[must_use]
pub fn is_issuance_in_progress(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<AcmeError>()
            .is_some_and(AcmeError::is_issuance_in_progress)
    })
}
