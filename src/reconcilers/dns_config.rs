// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of the feature config map against the managed DNS directory.
//!
//! When managed DNS is in use this ensures a domain and token have been reserved and
//! stored in the DNS secret. When it is switched off this purges the domain's records
//! from the directory, once. The last applied mode is kept as an annotation on the
//! DNS secret so the purge is not repeated on every reconcile.
//!
//! With Let's Encrypt enabled, the reserved domain's wildcard certificate is provisioned
//! at the end of each reconcile. The fast path reuses a current certificate without
//! contacting the CA.

use crate::config::{complete_from_cluster, DnsMode, FeatureConfig, LetsEncryptMode, RawConfig};
use crate::constants::{DNS_SECRET_DOMAIN_KEY, DNS_SECRET_TOKEN_KEY};
use crate::context::Context;
use crate::dns::state::{clear_dns_token, load_domain_state, DomainState};
use crate::dns_errors::DirectoryError;
use crate::labels::DNS_STATE_ANNOTATION;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// The DNS mode to record for `domain` under `cfg`.
///
/// Without a domain the configured mode is recorded as is. With a domain the mode is
/// `enabled` exactly when completion adopted the domain into the cluster domains.
#[must_use]
pub fn target_state(cfg: &FeatureConfig, domain: &str) -> DnsMode {
    if domain.is_empty() {
        cfg.dns
    } else if cfg.has_cluster_domain(domain) {
        DnsMode::Enabled
    } else {
        DnsMode::Disabled
    }
}

/// Reconcile the feature config map.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the directory rejects a purge or
/// reservation, the DNS secret cannot be written, or wildcard certificate provisioning
/// fails (including [`AcmeError::IssuanceInProgress`](crate::acme::AcmeError)).
pub async fn reconcile_dns_config(ctx: &Context, config_map: &ConfigMap) -> Result<()> {
    let store = ctx.store.as_ref();
    let namespace = ctx.namespace.as_str();
    debug!(name = %config_map.name_any(), %namespace, "Reconciling feature configuration");

    let raw = RawConfig::from_config_map(config_map)?;
    let cfg = complete_from_cluster(store, namespace, &raw).await?;

    let (secret, current) = match load_domain_state(store, namespace).await? {
        Some((secret, state)) => (Some(secret), state),
        None => (None, DomainState::default()),
    };

    let state = target_state(&cfg, &current.domain);
    purge_if_disabling(ctx, &cfg, &current, state).await?;

    let mut domain = current.domain.clone();
    let mut token = current.token.clone();
    if cfg.dns != DnsMode::Disabled && (domain.is_empty() || token.is_empty()) {
        if !domain.is_empty() {
            info!(%domain, "Clearing managed DNS domain without a token");
        }
        let (reserved, reserved_token) = ctx
            .directory
            .reserve_domain(&cfg.dns_endpoint)
            .await
            .context("problem reserving domain")?;
        info!(domain = %reserved, "Obtained managed DNS domain");
        domain = reserved;
        token = reserved_token;
    }

    let desired = DomainState {
        domain,
        token,
        state: Some(state),
    };
    match secret {
        None => {
            store
                .create_secret(&desired.to_secret(namespace))
                .await
                .context("failed to create DNS secret")?;
            info!(domain = %desired.domain, state = %state, "Created DNS secret");
        }
        Some(secret) => {
            if current != desired {
                store
                    .update_secret(&apply_state(secret, &desired))
                    .await
                    .context("failed to update DNS secret")?;
                info!(domain = %desired.domain, state = %state, "Updated DNS secret");
            }
        }
    }

    if cfg.lets_encrypt != LetsEncryptMode::Disabled && !desired.domain.is_empty() {
        if desired.token.is_empty() {
            debug!(domain = %desired.domain, "No DNS token, skipping wildcard certificate");
        } else {
            ctx.certificates
                .ensure_wildcard_certificate(&cfg, &desired.domain, &desired.token)
                .await?;
        }
    }

    Ok(())
}

/// Purge the domain's records when DNS has just been switched off.
///
/// A domain-auth rejection clears the stored token before the error is returned.
async fn purge_if_disabling(
    ctx: &Context,
    cfg: &FeatureConfig,
    current: &DomainState,
    state: DnsMode,
) -> Result<()> {
    if state != DnsMode::Disabled || current.state == Some(DnsMode::Disabled) {
        return Ok(());
    }
    if !current.is_complete() {
        return Ok(());
    }

    info!(domain = %current.domain, "Managed DNS disabled, purging records");
    match ctx
        .directory
        .purge_records(&cfg.dns_endpoint, &current.domain, &current.token)
        .await
    {
        Ok(()) => Ok(()),
        Err(DirectoryError::DomainAuth) => {
            clear_dns_token(ctx.store.as_ref(), &ctx.namespace).await?;
            Err(DirectoryError::DomainAuth.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Overwrite the state annotation and data of an existing DNS secret.
fn apply_state(mut secret: Secret, desired: &DomainState) -> Secret {
    if let Some(state) = desired.state {
        secret
            .annotations_mut()
            .insert(DNS_STATE_ANNOTATION.to_string(), state.as_str().to_string());
    }
    secret.data = Some(BTreeMap::from([
        (
            DNS_SECRET_DOMAIN_KEY.to_string(),
            ByteString(desired.domain.clone().into_bytes()),
        ),
        (
            DNS_SECRET_TOKEN_KEY.to_string(),
            ByteString(desired.token.clone().into_bytes()),
        ),
    ]));
    secret.string_data = None;
    secret
}

#[cfg(test)]
#[path = "dns_config_tests.rs"]
mod dns_config_tests;
