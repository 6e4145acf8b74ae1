// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Periodic renewal of the reserved domain and drift detection.
//!
//! Each cycle sends the full set of records derived from every managed ingress to the
//! directory's renew endpoint. The directory answers with the records it holds
//! differently (or not at all). The daemon does not push records itself: it removes
//! the sync hash annotation from the owning ingresses, which makes the ingress handler
//! push them again on its next reconcile.
//!
//! A cycle that fails for any reason reports "not done" and is retried with the
//! [`Backoff`] policy. Exhausting the retries is logged and left to the next scheduled
//! run.

use crate::config::{load_config, DnsMode};
use crate::dns::client::DirectoryApi;
use crate::dns::records::to_record_requests_and_hash;
use crate::dns::state::{clear_dns_token, load_domain_state};
use crate::dns::types::{RecordRequest, RenewRequest};
use crate::dns_errors::DirectoryError;
use crate::labels::{managed_selector, DNS_HASH_ANNOTATION};
use crate::metrics;
use crate::reconcilers::retry::{retry_with_backoff, Backoff, BackoffError};
use crate::store::ObjectStore;
use anyhow::{anyhow, Context as _, Result};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one successful renew-and-sync cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Managed DNS is disabled; nothing was sent
    Disabled,
    /// Renewal succeeded
    Synced {
        /// Records sent to the directory
        records: usize,
        /// Ingresses whose sync hash was cleared
        invalidated: usize,
    },
}

/// Background renew-and-sync loop.
pub struct SyncDaemon {
    store: Arc<dyn ObjectStore>,
    directory: Arc<dyn DirectoryApi>,
    namespace: String,
    version: String,
    backoff: Backoff,
}

impl SyncDaemon {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        directory: Arc<dyn DirectoryApi>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            namespace: namespace.into(),
            version: format!("v{}", env!("CARGO_PKG_VERSION")),
            backoff: Backoff::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run a cycle now and then every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Starting DNS renew-and-sync daemon");
        loop {
            if let Err(BackoffError::Cancelled) = self.renew_and_sync_with_retry(&cancel).await {
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        info!("DNS renew-and-sync daemon stopped");
    }

    /// Run [`Self::renew_and_sync`] under the backoff policy.
    ///
    /// # Errors
    ///
    /// Returns [`BackoffError::Exhausted`] when every attempt failed (already logged) or
    /// [`BackoffError::Cancelled`] on shutdown.
    pub async fn renew_and_sync_with_retry(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), BackoffError> {
        let result = retry_with_backoff(self.backoff, cancel, || async {
            match self.renew_and_sync().await {
                Ok(outcome) => {
                    metrics::record_daemon_cycle("success");
                    debug!(?outcome, "DNS renew-and-sync cycle complete");
                    true
                }
                Err(e) => {
                    metrics::record_daemon_cycle("retry");
                    warn!(error = format!("{e:#}"), "DNS renew-and-sync cycle failed");
                    false
                }
            }
        })
        .await;

        match &result {
            Ok(()) => {}
            Err(BackoffError::Exhausted { attempts }) => {
                metrics::record_daemon_cycle("exhausted");
                error!(attempts, "Couldn't complete DNS renew-and-sync");
            }
            Err(BackoffError::Cancelled) => metrics::record_daemon_cycle("cancelled"),
        }
        result
    }

    /// One renew-and-sync cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or domain state cannot be read, the domain or
    /// token is missing, renewal fails, or an ingress cannot be updated.
    pub async fn renew_and_sync(&self) -> Result<SyncOutcome> {
        let store = self.store.as_ref();
        let cfg = load_config(store, &self.namespace).await?;
        if cfg.dns == DnsMode::Disabled {
            debug!("Managed DNS is disabled, skipping renewal");
            return Ok(SyncOutcome::Disabled);
        }

        let state = load_domain_state(store, &self.namespace)
            .await?
            .map(|(_, state)| state)
            .filter(|state| state.is_complete())
            .ok_or_else(|| {
                anyhow!(
                    "DNS secret {}/{} is missing or has no domain or token",
                    self.namespace,
                    crate::constants::DNS_SECRET_NAME
                )
            })?;

        info!(domain = %state.domain, "Renewing and syncing managed DNS");

        let ingresses = store
            .list_ingresses(None, &managed_selector())
            .await
            .context("failed to list managed ingresses")?;
        let (records, owners) = collect_records(&state.domain, &ingresses);

        let request = RenewRequest {
            records,
            version: self.version.clone(),
        };
        let response = match self
            .directory
            .renew(&cfg.dns_endpoint, &state.domain, &state.token, &request)
            .await
        {
            Ok(response) => response,
            Err(DirectoryError::DomainAuth) => {
                clear_dns_token(store, &self.namespace).await?;
                return Err(DirectoryError::DomainAuth.into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut stale = BTreeSet::new();
        for record in &response.out_of_sync_records {
            let key = (normalize_fqdn(&record.fqdn), record.record_type.to_ascii_uppercase());
            match owners.get(&key) {
                Some(owner) => {
                    stale.insert(owner.clone());
                }
                None => debug!(fqdn = %record.fqdn, "Out-of-sync record has no managed ingress"),
            }
        }

        for (namespace, name) in &stale {
            self.invalidate(namespace, name).await?;
        }

        info!(
            domain = %state.domain,
            records = request.records.len(),
            out_of_sync = response.out_of_sync_records.len(),
            "Renewed and synced managed DNS"
        );
        Ok(SyncOutcome::Synced {
            records: request.records.len(),
            invalidated: stale.len(),
        })
    }

    /// Remove the sync hash so the ingress handler re-pushes this ingress.
    async fn invalidate(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(mut ingress) = self.store.get_ingress(namespace, name).await? else {
            return Ok(());
        };
        let removed = ingress
            .annotations_mut()
            .remove(DNS_HASH_ANNOTATION)
            .is_some();
        if removed {
            self.store
                .update_ingress(&ingress)
                .await
                .with_context(|| format!("failed to update ingress {namespace}/{name}"))?;
            info!(%namespace, %name, "Cleared DNS sync hash on out-of-sync ingress");
        }
        Ok(())
    }
}

type RecordKey = (String, String);

/// All records of `ingresses` plus the owning ingress of each `(fqdn, type)`.
fn collect_records(
    domain: &str,
    ingresses: &[Ingress],
) -> (Vec<RecordRequest>, BTreeMap<RecordKey, (String, String)>) {
    let mut records = Vec::new();
    let mut owners = BTreeMap::new();
    for ingress in ingresses {
        let (requests, _) = to_record_requests_and_hash(domain, ingress);
        let owner = (ingress.namespace().unwrap_or_default(), ingress.name_any());
        for request in requests {
            let fqdn = normalize_fqdn(&format!("{}{domain}", request.name));
            owners.insert((fqdn, request.record_type.as_str().to_string()), owner.clone());
            records.push(request);
        }
    }
    (records, owners)
}

fn normalize_fqdn(fqdn: &str) -> String {
    fqdn.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod daemon_tests;
