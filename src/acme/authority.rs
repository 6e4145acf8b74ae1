// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate authority access.
//!
//! [`CertificateAuthority`] is the seam between the certificate manager and the ACME
//! protocol. [`AcmeAuthority`] implements it with instant-acme; tests substitute a fake
//! that signs certificates locally.

use super::account::{private_key_pem, AccountSettings, AcmeAccount};
use super::challenge::{ChallengeKind, ChallengeRequest, ChallengeSolver};
use super::AcmeError;
use async_trait::async_trait;
use instant_acme::{
    Account, AuthorizationStatus, ChallengeType, Identifier, NewAccount, NewOrder, Order,
    OrderStatus, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Certificate chain and its private key, both PEM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

/// Registration and issuance against an ACME certificate authority.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Register a new account for `settings`.
    async fn register(&self, settings: &AccountSettings) -> Result<AcmeAccount, AcmeError>;

    /// Obtain a certificate for `domains`, answering challenges with `solver`.
    ///
    /// Validation is bounded by `timeout`. Every presented challenge is cleaned up before
    /// returning.
    async fn obtain(
        &self,
        account: &AcmeAccount,
        domains: &[String],
        solver: Arc<dyn ChallengeSolver>,
        timeout: Duration,
    ) -> Result<IssuedCertificate, AcmeError>;
}

/// [`CertificateAuthority`] speaking ACME through instant-acme.
#[derive(Clone, Debug, Default)]
pub struct AcmeAuthority;

impl AcmeAuthority {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Order polling bounded by `timeout` instead of instant-acme's 30 second default.
fn poll_policy(timeout: Duration) -> RetryPolicy {
    RetryPolicy::new().timeout(timeout)
}

fn poll_error(err: instant_acme::Error, timeout: Duration) -> AcmeError {
    match err {
        instant_acme::Error::Timeout(_) => AcmeError::Timeout {
            operation: "waiting for ACME challenge validation",
            secs: timeout.as_secs(),
        },
        other => other.into(),
    }
}

fn challenge_type(kind: ChallengeKind) -> ChallengeType {
    match kind {
        ChallengeKind::Dns01 => ChallengeType::Dns01,
        ChallengeKind::Http01 => ChallengeType::Http01,
    }
}

#[async_trait]
impl CertificateAuthority for AcmeAuthority {
    async fn register(&self, settings: &AccountSettings) -> Result<AcmeAccount, AcmeError> {
        let contact = format!("mailto:{}", settings.email);
        let (_, credentials) = Account::builder()?
            .create(
                &NewAccount {
                    contact: &[&contact],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                settings.directory_url.clone(),
                None,
            )
            .await
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?;

        let private_key_pem = private_key_pem(&credentials)?;
        let registration = serde_json::to_string(&credentials)?;
        info!(email = %settings.email, url = %settings.directory_url, "Registered ACME account");

        Ok(AcmeAccount {
            email: settings.email.clone(),
            directory_url: settings.directory_url.clone(),
            registration,
            private_key_pem,
        })
    }

    async fn obtain(
        &self,
        account: &AcmeAccount,
        domains: &[String],
        solver: Arc<dyn ChallengeSolver>,
        timeout: Duration,
    ) -> Result<IssuedCertificate, AcmeError> {
        let client = Account::builder()?
            .from_credentials(account.credentials()?)
            .await?;

        let identifiers: Vec<Identifier> =
            domains.iter().map(|d| Identifier::Dns(d.clone())).collect();
        let mut order = client
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| AcmeError::OrderCreation(e.to_string()))?;

        let mut presented = Vec::new();
        let result = validate(&mut order, solver.as_ref(), &mut presented, timeout).await;

        for challenge in &presented {
            if let Err(e) = solver.clean_up(challenge).await {
                warn!(identifier = %challenge.identifier, error = %e, "Failed to clean up ACME challenge");
            }
        }
        result?;

        let private_key_pem = order
            .finalize()
            .await
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;
        let certificate_pem = order
            .poll_certificate(&poll_policy(timeout))
            .await
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;

        Ok(IssuedCertificate {
            certificate_pem,
            private_key_pem,
        })
    }
}

/// Present every pending challenge and wait for the order to become ready.
async fn validate(
    order: &mut Order,
    solver: &dyn ChallengeSolver,
    presented: &mut Vec<ChallengeRequest>,
    timeout: Duration,
) -> Result<(), AcmeError> {
    let kind = solver.kind();
    {
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result?;
            if authz.status == AuthorizationStatus::Valid {
                continue;
            }

            let identifier = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.clone(),
                other => {
                    return Err(AcmeError::ChallengeValidation {
                        domain: format!("{other:?}"),
                        reason: "unsupported identifier type".to_string(),
                    })
                }
            };

            let mut challenge = authz.challenge(challenge_type(kind)).ok_or_else(|| {
                AcmeError::ChallengeValidation {
                    domain: identifier.clone(),
                    reason: format!("CA offered no {} challenge", kind.as_str()),
                }
            })?;

            let key_authorization = challenge.key_authorization();
            let request = ChallengeRequest {
                identifier,
                token: challenge.token.clone(),
                key_authorization: key_authorization.as_str().to_string(),
                dns_value: key_authorization.dns_value(),
            };

            solver.present(&request).await?;
            presented.push(request);
            challenge.set_ready().await?;
            debug!(challenge = kind.as_str(), "ACME challenge marked ready");
        }
    }

    let status = order
        .poll_ready(&poll_policy(timeout))
        .await
        .map_err(|e| poll_error(e, timeout))?;

    if status != OrderStatus::Ready {
        return Err(AcmeError::ChallengeValidation {
            domain: presented
                .iter()
                .map(|c| c.identifier.as_str())
                .collect::<Vec<_>>()
                .join(","),
            reason: format!("order is {status:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "authority_tests.rs"]
mod authority_tests;
