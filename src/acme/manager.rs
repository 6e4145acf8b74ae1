// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate orchestration.
//!
//! The [`CertificateManager`] owns the ACME account lifecycle, deduplicates concurrent
//! issuance per domain, decides when a stored certificate must be renewed, and persists
//! issued certificates as TLS secrets.
//!
//! # Issuance paths
//!
//! - Wildcard (`*.<reserved domain>`) certificates are validated over DNS-01 through the
//!   managed DNS directory.
//! - Custom domains are validated over HTTP-01. A responder is started on a free local
//!   port and a temporary Service and Ingress route the public
//!   `/.well-known/acme-challenge/` path to it for the duration of the order.
//!
//! Issuance runs inside the reconcile that requested it. A second request for a domain
//! that is already being issued fails fast with [`AcmeError::IssuanceInProgress`] so the
//! caller can requeue instead of blocking.

use super::account::{AccountSettings, AcmeAccount};
use super::authority::{CertificateAuthority, IssuedCertificate};
use super::certs::{
    annotation, certificate_from_secret, certificate_to_secret, copy_certificate_secret,
    must_renew, wildcard_domain,
};
use super::challenge::{ChallengeSolver, Dns01Bridge, Http01Responder};
use super::AcmeError;
use crate::config::FeatureConfig;
use crate::constants::{
    ACME_ACCOUNT_SECRET_NAME, DEFAULT_CHALLENGE_TIMEOUT_SECS, DEFAULT_HTTP01_READY_TIMEOUT_SECS,
    DEFAULT_HTTP01_SELECTOR_KEY, DEFAULT_HTTP01_SELECTOR_VALUE, DEFAULT_NAMESPACE,
    HTTP01_CHALLENGE_PATH, HTTP01_OBJECT_PREFIX, HTTP01_READY_POLL_INTERVAL_SECS,
    HTTP01_SERVICE_PORT, SECRET_TYPE_TLS, WILDCARD_TLS_SECRET_NAME,
};
use crate::dns::client::DirectoryApi;
use crate::dns::records::has_load_balancer_address;
use crate::dns::state::{clear_dns_token, load_domain_state};
use crate::labels::{
    managed_selector, COMPONENT_ACME_HTTP01, DOMAIN_ANNOTATION, K8S_COMPONENT, K8S_MANAGED_BY,
    MANAGED_BY_CLUSTERDOMAIN,
};
use crate::metrics;
use crate::store::{ObjectStore, StoreError};
use chrono::Utc;
use k8s_openapi::api::core::v1::{Secret, Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Set of domains currently being issued.
///
/// Membership is the mutual-exclusion mechanism: [`InFlightRequests::try_acquire`]
/// inserts atomically and the returned guard removes the entry when dropped, including
/// on error and panic paths.
#[derive(Clone, Debug, Default)]
pub struct InFlightRequests {
    domains: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `domain`, or `None` if another request already holds it.
    #[must_use]
    pub fn try_acquire(&self, domain: &str) -> Option<InFlightGuard> {
        let mut domains = self.domains.lock();
        if !domains.insert(domain.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            domains: Arc::clone(&self.domains),
            domain: domain.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, domain: &str) -> bool {
        self.domains.lock().contains(domain)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.lock().is_empty()
    }
}

/// Releases an in-flight claim on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    domains: Arc<Mutex<HashSet<String>>>,
    domain: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.domains.lock().remove(&self.domain);
    }
}

/// Tunables of the [`CertificateManager`].
#[derive(Clone, Debug)]
pub struct CertificateManagerSettings {
    /// Namespace holding the account, wildcard certificate, and HTTP-01 objects
    pub namespace: String,
    /// Bound on ACME challenge validation
    pub challenge_timeout: Duration,
    /// Bound on waiting for the HTTP-01 ingress to get an address
    pub http01_ready_timeout: Duration,
    pub http01_poll_interval: Duration,
    /// Pod selector of the temporary HTTP-01 Service (the controller's own pods).
    /// Must not be empty: a Service without a selector has no endpoints.
    pub http01_selector: BTreeMap<String, String>,
}

impl Default for CertificateManagerSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            challenge_timeout: Duration::from_secs(DEFAULT_CHALLENGE_TIMEOUT_SECS),
            http01_ready_timeout: Duration::from_secs(DEFAULT_HTTP01_READY_TIMEOUT_SECS),
            http01_poll_interval: Duration::from_secs(HTTP01_READY_POLL_INTERVAL_SECS),
            http01_selector: BTreeMap::from([(
                DEFAULT_HTTP01_SELECTOR_KEY.to_string(),
                DEFAULT_HTTP01_SELECTOR_VALUE.to_string(),
            )]),
        }
    }
}

/// Orchestrates ACME accounts and certificates.
pub struct CertificateManager {
    store: Arc<dyn ObjectStore>,
    directory: Arc<dyn DirectoryApi>,
    authority: Arc<dyn CertificateAuthority>,
    in_flight: InFlightRequests,
    settings: CertificateManagerSettings,
    cancel: CancellationToken,
}

impl CertificateManager {
    /// Build a manager. Waits and orders are abandoned once `cancel` fires.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        directory: Arc<dyn DirectoryApi>,
        authority: Arc<dyn CertificateAuthority>,
        settings: CertificateManagerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            directory,
            authority,
            in_flight: InFlightRequests::new(),
            settings,
            cancel,
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> &InFlightRequests {
        &self.in_flight
    }

    #[must_use]
    pub fn settings(&self) -> &CertificateManagerSettings {
        &self.settings
    }

    /// Return the registered account matching `config`, registering one if needed.
    ///
    /// A stored account whose settings hash differs from the configuration is deleted and
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the store fails, or registration
    /// with the CA fails.
    pub async fn ensure_account(&self, config: &FeatureConfig) -> Result<AcmeAccount, AcmeError> {
        let settings = AccountSettings::from_config(config)?;
        let desired = settings.hash();
        let namespace = &self.settings.namespace;

        if let Some(secret) = self
            .store
            .get_secret(namespace, ACME_ACCOUNT_SECRET_NAME)
            .await?
        {
            match AcmeAccount::from_secret(&secret) {
                Ok(current) if current.settings_hash() == desired => return Ok(current),
                Ok(current) => {
                    info!(
                        old_email = %current.email,
                        new_email = %settings.email,
                        new_url = %settings.directory_url,
                        "ACME account settings changed, re-registering"
                    );
                }
                Err(e) => warn!(error = %e, "Stored ACME account is unreadable, re-registering"),
            }
            self.store
                .delete_secret(namespace, ACME_ACCOUNT_SECRET_NAME)
                .await?;
        }

        let account = self.authority.register(&settings).await?;
        match self.store.create_secret(&account.to_secret(namespace)).await {
            Ok(_) => {
                info!(email = %account.email, "Stored ACME account");
                Ok(account)
            }
            // A concurrent reconcile registered first; use its account if it matches.
            Err(StoreError::AlreadyExists { .. }) => {
                let secret = self
                    .store
                    .get_secret(namespace, ACME_ACCOUNT_SECRET_NAME)
                    .await?;
                match secret.map(|s| AcmeAccount::from_secret(&s)).transpose()? {
                    Some(existing) if existing.settings_hash() == desired => Ok(existing),
                    _ => Err(AcmeError::AccountCreation(
                        "account secret was replaced concurrently".to_string(),
                    )),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure the wildcard certificate for the reserved `domain` exists and is current.
    ///
    /// A stored certificate issued for the same wildcard under the current account settings
    /// and not within the renewal threshold is returned without contacting the CA.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::IssuanceInProgress`] if another request is issuing the same
    /// wildcard, or any account, issuance, or store failure.
    pub async fn ensure_wildcard_certificate(
        &self,
        config: &FeatureConfig,
        domain: &str,
        token: &str,
    ) -> Result<Secret, AcmeError> {
        let account_hash = AccountSettings::from_config(config)?.hash();
        let wildcard = wildcard_domain(domain);
        let namespace = &self.settings.namespace;

        let existing = self
            .store
            .get_secret(namespace, WILDCARD_TLS_SECRET_NAME)
            .await?;
        if let Some(secret) = &existing {
            if is_reusable(secret, &wildcard, &account_hash) {
                debug!(domain = %wildcard, "Wildcard certificate is current");
                return Ok(secret.clone());
            }
            if annotation(secret, DOMAIN_ANNOTATION) != Some(wildcard.as_str()) {
                info!(
                    old = annotation(secret, DOMAIN_ANNOTATION).unwrap_or_default(),
                    new = %wildcard,
                    "Wildcard domain changed, re-issuing certificate"
                );
            }
        }

        let _guard = self.claim(&wildcard)?;
        // The previous holder of the claim may have stored a certificate since the read above
        let existing = self
            .store
            .get_secret(namespace, WILDCARD_TLS_SECRET_NAME)
            .await?;
        if let Some(secret) = existing
            .as_ref()
            .filter(|s| is_reusable(s, &wildcard, &account_hash))
        {
            debug!(domain = %wildcard, "Wildcard certificate was stored concurrently");
            return Ok(secret.clone());
        }

        let account = self.ensure_account(config).await?;
        let bridge = Arc::new(Dns01Bridge::new(
            Arc::clone(&self.directory),
            config.dns_endpoint.clone(),
            domain,
            token,
        ));
        let issued = self.issue_dns01(&account, &wildcard, bridge).await?;

        let secret = certificate_to_secret(
            &issued,
            &wildcard,
            &account_hash,
            namespace,
            WILDCARD_TLS_SECRET_NAME,
        )?;
        let stored = self.persist(existing.as_ref(), secret).await?;
        info!(domain = %wildcard, "Wildcard certificate stored");
        Ok(stored)
    }

    /// Ensure a certificate for the custom `domain` exists in `namespace/secret_name`.
    ///
    /// An existing secret for the same domain is left alone; renewal is driven by
    /// [`Self::renew_certificate`]. A parseable managed certificate for the same domain
    /// elsewhere is reused (same namespace) or copied before issuing a new one over HTTP-01.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::IssuanceInProgress`] if the domain is already being issued, or
    /// any account, challenge, issuance, or store failure.
    pub async fn ensure_domain_certificate(
        &self,
        config: &FeatureConfig,
        domain: &str,
        namespace: &str,
        secret_name: &str,
    ) -> Result<(), AcmeError> {
        let existing = self.store.get_secret(namespace, secret_name).await?;
        if let Some(secret) = &existing {
            if annotation(secret, DOMAIN_ANNOTATION) == Some(domain) {
                debug!(%domain, %namespace, secret = %secret_name, "Certificate secret already exists");
                return Ok(());
            }
            debug!(%domain, %namespace, secret = %secret_name, "Replacing certificate for a different domain");
        } else if self.reuse_existing_certificate(domain, namespace, secret_name).await? {
            return Ok(());
        }

        let _guard = self.claim(domain)?;
        let existing = self.store.get_secret(namespace, secret_name).await?;
        if existing
            .as_ref()
            .is_some_and(|s| annotation(s, DOMAIN_ANNOTATION) == Some(domain))
        {
            debug!(%domain, %namespace, secret = %secret_name, "Certificate was stored concurrently");
            return Ok(());
        }
        if existing.is_none()
            && self
                .reuse_existing_certificate(domain, namespace, secret_name)
                .await?
        {
            return Ok(());
        }

        let account = self.ensure_account(config).await?;
        let issued = self.issue_http01(&account, domain).await?;
        let secret = certificate_to_secret(
            &issued,
            domain,
            &account.settings_hash(),
            namespace,
            secret_name,
        )?;
        self.persist(existing.as_ref(), secret).await?;
        info!(%domain, %namespace, secret = %secret_name, "Certificate stored");
        Ok(())
    }

    /// Re-issue the certificate in `secret` if it must be renewed.
    ///
    /// Wildcard certificates are validated over DNS-01 with the stored domain token, other
    /// domains over HTTP-01. Returns `true` when a new certificate was stored.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::IssuanceInProgress`] if the domain is already being issued, or
    /// any account, challenge, issuance, or store failure.
    pub async fn renew_certificate(
        &self,
        config: &FeatureConfig,
        secret: &Secret,
    ) -> Result<bool, AcmeError> {
        let Some(domain) = annotation(secret, DOMAIN_ANNOTATION).map(str::to_string) else {
            return Ok(false);
        };
        let account_hash = AccountSettings::from_config(config)?.hash();
        if !must_renew(secret, &account_hash, Utc::now()) {
            return Ok(false);
        }

        let _guard = self.claim(&domain)?;
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let Some(current) = self.store.get_secret(&namespace, &name).await? else {
            debug!(%domain, %namespace, secret = %name, "Certificate secret is gone, not renewing");
            return Ok(false);
        };
        if annotation(&current, DOMAIN_ANNOTATION) != Some(domain.as_str())
            || !must_renew(&current, &account_hash, Utc::now())
        {
            debug!(%domain, %namespace, secret = %name, "Certificate was renewed concurrently");
            return Ok(false);
        }
        info!(%domain, %namespace, secret = %name, "Renewing certificate");

        let account = self.ensure_account(config).await?;
        let issued = if let Some(base) = domain.strip_prefix("*.") {
            let state = load_domain_state(self.store.as_ref(), &self.settings.namespace)
                .await
                .map_err(StoreError::from)?
                .map(|(_, state)| state)
                .filter(|state| state.is_complete())
                .ok_or_else(|| {
                    AcmeError::Configuration(format!(
                        "no DNS domain token available to renew {domain}"
                    ))
                })?;
            let bridge = Arc::new(Dns01Bridge::new(
                Arc::clone(&self.directory),
                config.dns_endpoint.clone(),
                format!(".{base}"),
                state.token,
            ));
            self.issue_dns01(&account, &domain, bridge).await?
        } else {
            self.issue_http01(&account, &domain).await?
        };

        let renewed = certificate_to_secret(&issued, &domain, &account_hash, &namespace, &name)?;
        self.persist(Some(&current), renewed).await?;
        info!(%domain, %namespace, secret = %name, "Certificate renewed");
        Ok(true)
    }

    /// Reuse or copy a managed certificate for `domain` from elsewhere in the cluster.
    ///
    /// Returns `true` when `namespace` now has a certificate for the domain.
    async fn reuse_existing_certificate(
        &self,
        domain: &str,
        namespace: &str,
        secret_name: &str,
    ) -> Result<bool, AcmeError> {
        let Some(found) = self.find_existing_certificate(domain).await? else {
            return Ok(false);
        };
        if found.namespace().as_deref() == Some(namespace) {
            debug!(%domain, secret = %found.name_any(), "Reusing existing certificate in namespace");
            return Ok(true);
        }
        let copy = copy_certificate_secret(&found, domain, namespace, secret_name);
        self.store.create_secret(&copy).await?;
        info!(
            %domain,
            from = %format!("{}/{}", found.namespace().unwrap_or_default(), found.name_any()),
            to = %format!("{namespace}/{secret_name}"),
            "Copied existing certificate"
        );
        Ok(true)
    }

    fn claim(&self, domain: &str) -> Result<InFlightGuard, AcmeError> {
        self.in_flight.try_acquire(domain).ok_or_else(|| {
            debug!(%domain, "Certificate request already in progress");
            AcmeError::IssuanceInProgress {
                domain: domain.to_string(),
            }
        })
    }

    /// Run one order through the authority, abandoning it on shutdown.
    async fn issue(
        &self,
        account: &AcmeAccount,
        domain: &str,
        solver: Arc<dyn ChallengeSolver>,
    ) -> Result<IssuedCertificate, AcmeError> {
        let kind = solver.kind();
        info!(%domain, challenge = kind.as_str(), "Requesting certificate");

        let domains = [domain.to_string()];
        let result = tokio::select! {
            () = self.cancel.cancelled() => Err(AcmeError::Cancelled),
            r = self.authority.obtain(account, &domains, solver, self.settings.challenge_timeout) => r,
        };

        match &result {
            Ok(_) => metrics::record_certificate_issuance(kind.as_str(), "success"),
            Err(e) => {
                metrics::record_certificate_issuance(kind.as_str(), "error");
                warn!(%domain, challenge = kind.as_str(), error = %e, "Certificate request failed");
            }
        }
        result
    }

    /// DNS-01 issuance through the managed directory.
    ///
    /// A domain-auth rejection on any directory call clears the stored DNS token (keeping
    /// the domain) so the next config reconcile reserves a fresh one.
    async fn issue_dns01(
        &self,
        account: &AcmeAccount,
        domain: &str,
        bridge: Arc<Dns01Bridge>,
    ) -> Result<IssuedCertificate, AcmeError> {
        let solver: Arc<dyn ChallengeSolver> = bridge.clone();
        let result = self.issue(account, domain, solver).await;

        if bridge.domain_rejected() || result.as_ref().is_err_and(AcmeError::is_domain_auth) {
            warn!(%domain, "DNS directory rejected the domain token, clearing it");
            clear_dns_token(self.store.as_ref(), &self.settings.namespace)
                .await
                .map_err(StoreError::from)?;
        }
        result
    }

    /// HTTP-01 issuance with temporary routing. Routing objects are always removed.
    async fn issue_http01(
        &self,
        account: &AcmeAccount,
        domain: &str,
    ) -> Result<IssuedCertificate, AcmeError> {
        if self.settings.http01_selector.is_empty() {
            return Err(AcmeError::Configuration(format!(
                "no HTTP-01 pod selector configured, cannot validate {domain}"
            )));
        }
        let responder = Http01Responder::start().await?;
        let namespace = self.settings.namespace.clone();
        let name = http01_object_name(domain);

        let result = self
            .issue_via_responder(account, domain, &namespace, &name, &responder)
            .await;

        if let Err(e) = self.store.delete_ingress(&namespace, &name).await {
            warn!(%namespace, %name, error = %e, "Failed to delete HTTP-01 ingress");
        }
        if let Err(e) = self.store.delete_service(&namespace, &name).await {
            warn!(%namespace, %name, error = %e, "Failed to delete HTTP-01 service");
        }
        responder.shutdown().await;
        result
    }

    async fn issue_via_responder(
        &self,
        account: &AcmeAccount,
        domain: &str,
        namespace: &str,
        name: &str,
        responder: &Http01Responder,
    ) -> Result<IssuedCertificate, AcmeError> {
        let service = http01_service(
            namespace,
            name,
            responder.port(),
            &self.settings.http01_selector,
        );
        match self.store.create_service(&service).await {
            Ok(_) | Err(StoreError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        match self.store.create_ingress(&http01_ingress(namespace, name, domain)).await {
            Ok(_) | Err(StoreError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        debug!(%domain, %namespace, %name, port = responder.port(), "Created HTTP-01 routing");

        self.wait_for_ingress_address(namespace, name).await?;
        self.issue(account, domain, responder.solver()).await
    }

    /// Poll until the ingress has a load-balancer address, bounded and cancellable.
    async fn wait_for_ingress_address(&self, namespace: &str, name: &str) -> Result<(), AcmeError> {
        let poll = async {
            loop {
                match self.store.get_ingress(namespace, name).await {
                    Ok(Some(ingress)) if has_load_balancer_address(&ingress) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(AcmeError::from(e)),
                }
                tokio::time::sleep(self.settings.http01_poll_interval).await;
            }
        };

        let timeout = self.settings.http01_ready_timeout;
        tokio::select! {
            () = self.cancel.cancelled() => Err(AcmeError::Cancelled),
            r = tokio::time::timeout(timeout, poll) => r.unwrap_or_else(|_| Err(AcmeError::Timeout {
                operation: "waiting for the HTTP-01 ingress address",
                secs: timeout.as_secs(),
            })),
        }
    }

    /// A parseable managed TLS secret, in any namespace, issued for `domain`.
    async fn find_existing_certificate(&self, domain: &str) -> Result<Option<Secret>, AcmeError> {
        let secrets = self.store.list_secrets(None, &managed_selector()).await?;
        Ok(secrets.into_iter().find(|secret| {
            secret.type_.as_deref() == Some(SECRET_TYPE_TLS)
                && annotation(secret, DOMAIN_ANNOTATION) == Some(domain)
                && certificate_from_secret(secret).is_ok_and(|cert| cert.covers_host(domain))
        }))
    }

    /// Create `secret`, or replace `existing` with it under compare-and-update.
    async fn persist(&self, existing: Option<&Secret>, mut secret: Secret) -> Result<Secret, AcmeError> {
        match existing {
            Some(current) => {
                secret.metadata.resource_version = current.metadata.resource_version.clone();
                Ok(self.store.update_secret(&secret).await?)
            }
            None => Ok(self.store.create_secret(&secret).await?),
        }
    }
}

/// True when `secret` holds a certificate for `domain` that needs no renewal under
/// `account_hash`.
fn is_reusable(secret: &Secret, domain: &str, account_hash: &str) -> bool {
    annotation(secret, DOMAIN_ANNOTATION) == Some(domain)
        && !must_renew(secret, account_hash, Utc::now())
}

/// Name of the temporary HTTP-01 Service and Ingress for `domain`.
#[must_use]
pub fn http01_object_name(domain: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(domain.as_bytes()));
    format!("{HTTP01_OBJECT_PREFIX}{}", &digest[..10])
}

fn http01_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_CLUSTERDOMAIN.to_string(),
        ),
        (K8S_COMPONENT.to_string(), COMPONENT_ACME_HTTP01.to_string()),
    ])
}

fn http01_service(
    namespace: &str,
    name: &str,
    port: u16,
    selector: &BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(http01_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: HTTP01_SERVICE_PORT,
                target_port: Some(IntOrString::Int(i32::from(port))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn http01_ingress(namespace: &str, name: &str, domain: &str) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(http01_labels()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(domain.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(HTTP01_CHALLENGE_PATH.to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: name.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(HTTP01_SERVICE_PORT),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
