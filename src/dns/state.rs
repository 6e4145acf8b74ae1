// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persisted domain/token state.
//!
//! The reserved domain and its bearer token live in the `clusterdomain-dns` secret in the
//! controller namespace. The last applied DNS feature mode is recorded in an annotation
//! on the same secret so the config reconciler can tell when the feature was just turned
//! off.

use crate::config::DnsMode;
use crate::constants::{DNS_SECRET_DOMAIN_KEY, DNS_SECRET_NAME, DNS_SECRET_TOKEN_KEY};
use crate::labels::{DNS_STATE_ANNOTATION, K8S_MANAGED_BY, MANAGED_BY_CLUSTERDOMAIN};
use crate::store::ObjectStore;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::info;

/// Domain, token, and last applied mode as stored in the DNS secret.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DomainState {
    /// Reserved domain with a leading dot, empty if none
    pub domain: String,
    /// Directory bearer token, empty if none
    pub token: String,
    /// Last applied DNS mode, `None` if never recorded
    pub state: Option<DnsMode>,
}

impl DomainState {
    /// Read the state out of a DNS secret.
    #[must_use]
    pub fn from_secret(secret: &Secret) -> Self {
        Self {
            domain: secret_value(secret, DNS_SECRET_DOMAIN_KEY),
            token: secret_value(secret, DNS_SECRET_TOKEN_KEY),
            state: secret
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(DNS_STATE_ANNOTATION))
                .and_then(|s| s.parse().ok()),
        }
    }

    /// True when both a domain and a token are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.domain.is_empty() && !self.token.is_empty()
    }

    /// Build the DNS secret for this state in `namespace`.
    #[must_use]
    pub fn to_secret(&self, namespace: &str) -> Secret {
        let mut annotations = BTreeMap::new();
        if let Some(state) = self.state {
            annotations.insert(DNS_STATE_ANNOTATION.to_string(), state.as_str().to_string());
        }
        Secret {
            metadata: ObjectMeta {
                name: Some(DNS_SECRET_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    K8S_MANAGED_BY.to_string(),
                    MANAGED_BY_CLUSTERDOMAIN.to_string(),
                )])),
                annotations: Some(annotations),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (
                    DNS_SECRET_DOMAIN_KEY.to_string(),
                    ByteString(self.domain.clone().into_bytes()),
                ),
                (
                    DNS_SECRET_TOKEN_KEY.to_string(),
                    ByteString(self.token.clone().into_bytes()),
                ),
            ])),
            ..Default::default()
        }
    }
}

/// Read a string value out of a secret's `data` (or `stringData`), empty if absent.
#[must_use]
pub fn secret_value(secret: &Secret, key: &str) -> String {
    if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8_lossy(&value.0).into_owned();
    }
    secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(key))
        .cloned()
        .unwrap_or_default()
}

/// Load the DNS secret and its decoded state.
///
/// # Errors
///
/// Returns an error if the object store cannot be read.
pub async fn load_domain_state(
    store: &dyn ObjectStore,
    namespace: &str,
) -> Result<Option<(Secret, DomainState)>> {
    let secret = store
        .get_secret(namespace, DNS_SECRET_NAME)
        .await
        .with_context(|| format!("failed to read secret {namespace}/{DNS_SECRET_NAME}"))?;
    Ok(secret.map(|s| {
        let state = DomainState::from_secret(&s);
        (s, state)
    }))
}

/// Clear the stored token while keeping the domain.
///
/// The next reconcile with DNS enabled then reserves a new domain. Does nothing if the
/// secret is missing or already has no token.
///
/// # Errors
///
/// Returns an error if the secret cannot be read or the compare-and-update fails.
pub async fn clear_dns_token(store: &dyn ObjectStore, namespace: &str) -> Result<()> {
    let Some((mut secret, state)) = load_domain_state(store, namespace).await? else {
        return Ok(());
    };
    if state.token.is_empty() {
        return Ok(());
    }

    let data = secret.data.get_or_insert_with(BTreeMap::new);
    data.insert(DNS_SECRET_TOKEN_KEY.to_string(), ByteString(Vec::new()));
    if let Some(string_data) = secret.string_data.as_mut() {
        string_data.remove(DNS_SECRET_TOKEN_KEY);
    }

    store
        .update_secret(&secret)
        .await
        .context("failed to clear DNS token")?;
    info!(domain = %state.domain, "Cleared DNS token after domain authentication failure");
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
