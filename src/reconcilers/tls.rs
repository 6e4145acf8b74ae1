// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Renewal of managed TLS secrets.

use crate::acme::certs::annotation;
use crate::config::{load_config, LetsEncryptMode};
use crate::constants::SECRET_TYPE_TLS;
use crate::context::Context;
use crate::labels::DOMAIN_ANNOTATION;
use anyhow::Result;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::debug;

/// True for `kubernetes.io/tls` secrets carrying a domain annotation.
#[must_use]
pub fn is_renewable(secret: &Secret) -> bool {
    secret.type_.as_deref() == Some(SECRET_TYPE_TLS)
        && annotation(secret, DOMAIN_ANNOTATION).is_some_and(|d| !d.is_empty())
}

/// Re-issue the certificate in `secret` when it must be renewed.
///
/// Returns `true` when a new certificate was stored.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or renewal fails, including
/// [`AcmeError::IssuanceInProgress`](crate::acme::AcmeError) when the domain is already
/// being issued.
pub async fn reconcile_tls_secret(ctx: &Context, secret: &Secret) -> Result<bool> {
    if !is_renewable(secret) {
        return Ok(false);
    }

    let cfg = load_config(ctx.store.as_ref(), &ctx.namespace).await?;
    if cfg.lets_encrypt == LetsEncryptMode::Disabled {
        debug!(secret = %secret.name_any(), "Let's Encrypt is disabled, not renewing");
        return Ok(false);
    }

    let renewed = ctx.certificates.renew_certificate(&cfg, secret).await?;
    if !renewed {
        debug!(
            namespace = %secret.namespace().unwrap_or_default(),
            secret = %secret.name_any(),
            "Certificate is still valid"
        );
    }
    Ok(renewed)
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tls_tests;
