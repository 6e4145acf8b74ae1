// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of managed ingresses.
//!
//! # DNS
//!
//! The records for an ingress are pushed to the directory only when they changed since
//! the last push. The content hash of the last pushed records is stored in the
//! [`DNS_HASH_ANNOTATION`] annotation; the sync daemon removes it to force a re-push.
//! [`plan_ingress_sync`] is the pure decision, [`reconcile_ingress_dns`] applies it.
//!
//! # Custom-domain certificates
//!
//! TLS entries naming a secret for hosts outside every cluster domain get a certificate
//! issued over HTTP-01 into that secret, unless Let's Encrypt is disabled.

use crate::config::{load_config, FeatureConfig, LetsEncryptMode};
use crate::context::Context;
use crate::dns::records::{has_load_balancer_address, to_record_requests_and_hash};
use crate::dns::state::{clear_dns_token, load_domain_state, DomainState};
use crate::dns::types::RecordRequest;
use crate::dns_errors::DirectoryError;
use crate::labels::DNS_HASH_ANNOTATION;
use anyhow::{Context as _, Result};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info};

/// What a reconcile has to do for an ingress's DNS records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngressSyncPlan {
    /// Nothing to push and the stored hash is current
    Skip,
    /// Push `records` and store `hash`
    Push {
        records: Vec<RecordRequest>,
        hash: String,
    },
    /// The ingress is no longer under the managed domain; drop the stored hash
    ClearHash,
}

/// Decide what to do for `ingress`.
///
/// An ingress without a load-balancer address, or a domain state without a domain or
/// token, is skipped. Under the managed domain the computed records are pushed unless
/// there are none or their hash equals the stored one. Outside it nothing is pushed and
/// a stale stored hash is cleared.
#[must_use]
pub fn plan_ingress_sync(cfg: &FeatureConfig, state: &DomainState, ingress: &Ingress) -> IngressSyncPlan {
    if !has_load_balancer_address(ingress) || !state.is_complete() {
        return IngressSyncPlan::Skip;
    }

    let stored = stored_hash(ingress);
    if !cfg.has_cluster_domain(&state.domain) {
        return if stored.is_empty() {
            IngressSyncPlan::Skip
        } else {
            IngressSyncPlan::ClearHash
        };
    }

    let (records, hash) = to_record_requests_and_hash(&state.domain, ingress);
    if records.is_empty() || hash == stored {
        return IngressSyncPlan::Skip;
    }
    IngressSyncPlan::Push { records, hash }
}

fn stored_hash(ingress: &Ingress) -> &str {
    ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(DNS_HASH_ANNOTATION))
        .map_or("", String::as_str)
}

/// Reconcile a managed ingress: DNS records first, then custom-domain certificates.
///
/// # Errors
///
/// Returns an error if the configuration or DNS secret cannot be read, the directory
/// rejects the records, the ingress cannot be updated, or certificate provisioning fails.
pub async fn reconcile_ingress(ctx: &Context, ingress: &Ingress) -> Result<()> {
    let cfg = load_config(ctx.store.as_ref(), &ctx.namespace).await?;
    reconcile_ingress_dns(ctx, &cfg, ingress).await?;
    reconcile_ingress_certificates(ctx, &cfg, ingress).await
}

/// Push the ingress's records to the directory if they changed.
///
/// Returns the plan that was applied.
///
/// # Errors
///
/// Returns an error if the DNS secret cannot be read, record creation fails (a
/// domain-auth rejection also clears the stored token), or the ingress update fails.
pub async fn reconcile_ingress_dns(
    ctx: &Context,
    cfg: &FeatureConfig,
    ingress: &Ingress,
) -> Result<IngressSyncPlan> {
    let namespace = ingress.namespace().unwrap_or_default();
    let name = ingress.name_any();

    let Some((_, state)) = load_domain_state(ctx.store.as_ref(), &ctx.namespace).await? else {
        debug!(%namespace, %name, "DNS secret does not exist, nothing to do");
        return Ok(IngressSyncPlan::Skip);
    };
    if !state.is_complete() && has_load_balancer_address(ingress) {
        info!(domain = %state.domain, "DNS secret missing domain or token, not requesting records");
    }

    let plan = plan_ingress_sync(cfg, &state, ingress);
    match &plan {
        IngressSyncPlan::Skip => {
            debug!(%namespace, %name, "Ingress DNS is in sync");
        }
        IngressSyncPlan::Push { records, hash } => {
            match ctx
                .directory
                .create_records(&cfg.dns_endpoint, &state.domain, &state.token, records)
                .await
            {
                Ok(()) => {}
                Err(DirectoryError::DomainAuth) => {
                    clear_dns_token(ctx.store.as_ref(), &ctx.namespace).await?;
                    return Err(DirectoryError::DomainAuth.into());
                }
                Err(e) => return Err(e.into()),
            }

            let mut updated = ingress.clone();
            updated
                .annotations_mut()
                .insert(DNS_HASH_ANNOTATION.to_string(), hash.clone());
            ctx.store
                .update_ingress(&updated)
                .await
                .with_context(|| format!("failed to update ingress {namespace}/{name}"))?;
            info!(%namespace, %name, records = records.len(), "Synced ingress DNS records");
        }
        IngressSyncPlan::ClearHash => {
            let mut updated = ingress.clone();
            updated.annotations_mut().remove(DNS_HASH_ANNOTATION);
            ctx.store
                .update_ingress(&updated)
                .await
                .with_context(|| format!("failed to update ingress {namespace}/{name}"))?;
            debug!(%namespace, %name, "Cleared DNS hash of ingress outside the managed domain");
        }
    }
    Ok(plan)
}

/// `(host, secret name)` pairs of TLS entries outside every cluster domain.
#[must_use]
pub fn custom_tls_hosts(cfg: &FeatureConfig, ingress: &Ingress) -> Vec<(String, String)> {
    let Some(tls) = ingress.spec.as_ref().and_then(|s| s.tls.as_ref()) else {
        return Vec::new();
    };
    let mut hosts = Vec::new();
    for entry in tls {
        let Some(secret_name) = entry.secret_name.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        for host in entry.hosts.iter().flatten() {
            if host.is_empty() || host.starts_with("*.") || cfg.is_cluster_host(host) {
                continue;
            }
            hosts.push((host.clone(), secret_name.to_string()));
        }
    }
    hosts
}

/// Ensure a certificate exists for every custom TLS host of the ingress.
///
/// # Errors
///
/// Returns the first provisioning failure.
pub async fn reconcile_ingress_certificates(
    ctx: &Context,
    cfg: &FeatureConfig,
    ingress: &Ingress,
) -> Result<()> {
    if cfg.lets_encrypt == LetsEncryptMode::Disabled {
        return Ok(());
    }
    let namespace = ingress.namespace().unwrap_or_default();
    for (host, secret_name) in custom_tls_hosts(cfg, ingress) {
        ctx.certificates
            .ensure_domain_certificate(cfg, &host, &namespace, &secret_name)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
