// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fakes and fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use clusterdomain::acme::{
    AccountSettings, AcmeAccount, AcmeError, CertificateAuthority, CertificateManager,
    CertificateManagerSettings, ChallengeRequest, ChallengeSolver, IssuedCertificate,
};
use clusterdomain::config::DnsMode;
use clusterdomain::constants::{CONFIG_MAP_KEY, CONFIG_MAP_NAME};
use clusterdomain::context::Context;
use clusterdomain::dns::client::DirectoryApi;
use clusterdomain::dns::state::DomainState;
use clusterdomain::dns::types::{RecordRequest, RenewRequest, RenewResponse};
use clusterdomain::dns_errors::DirectoryError;
use clusterdomain::labels::{MANAGED_LABEL, MANAGED_LABEL_VALUE};
use clusterdomain::store::MemoryStore;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::networking::v1::{
    Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec,
    IngressStatus, IngressTLS,
};
use kube::api::ObjectMeta;
use parking_lot::Mutex;
use rcgen::{CertificateParams, KeyPair};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const NS: &str = "acorn-system";
pub const DOMAIN: &str = ".abc.oss-acorn.io";
pub const TOKEN: &str = "secret-token";
pub const LB_IP: &str = "203.0.113.10";

// ============================================================================
// DNS directory fake
// ============================================================================

/// Recording [`DirectoryApi`] with injectable failures.
#[derive(Default)]
pub struct FakeDirectory {
    pub reservations: Mutex<Vec<(String, String)>>,
    pub reserved: AtomicUsize,
    pub created: Mutex<Vec<Vec<RecordRequest>>>,
    pub deleted: Mutex<Vec<String>>,
    pub purged: AtomicUsize,
    pub renewed: Mutex<Vec<RenewRequest>>,
    pub renew_response: Mutex<RenewResponse>,
    pub failure: Mutex<Option<DirectoryError>>,
}

impl FakeDirectory {
    /// A directory that hands out `domain`/`token` on reservation.
    pub fn reserving(domain: &str, token: &str) -> Arc<Self> {
        let directory = Self::default();
        directory
            .reservations
            .lock()
            .push((domain.to_string(), token.to_string()));
        Arc::new(directory)
    }

    /// Fail every authenticated call with `error` from now on.
    pub fn fail_with(&self, error: DirectoryError) {
        *self.failure.lock() = Some(error);
    }

    pub fn create_calls(&self) -> usize {
        self.created.lock().len()
    }

    fn check(&self) -> Result<(), DirectoryError> {
        match self.failure.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryApi for FakeDirectory {
    async fn reserve_domain(&self, _: &str) -> Result<(String, String), DirectoryError> {
        self.reserved.fetch_add(1, Ordering::SeqCst);
        let reservations = self.reservations.lock();
        Ok(reservations
            .first()
            .cloned()
            .unwrap_or_else(|| (DOMAIN.to_string(), TOKEN.to_string())))
    }

    async fn create_records(
        &self,
        _: &str,
        _: &str,
        _: &str,
        records: &[RecordRequest],
    ) -> Result<(), DirectoryError> {
        self.check()?;
        self.created.lock().push(records.to_vec());
        Ok(())
    }

    async fn renew(
        &self,
        _: &str,
        _: &str,
        _: &str,
        request: &RenewRequest,
    ) -> Result<RenewResponse, DirectoryError> {
        self.check()?;
        self.renewed.lock().push(request.clone());
        Ok(self.renew_response.lock().clone())
    }

    async fn delete_record(
        &self,
        _: &str,
        _: &str,
        _: &str,
        prefix: &str,
    ) -> Result<(), DirectoryError> {
        self.deleted.lock().push(prefix.to_string());
        Ok(())
    }

    async fn purge_records(&self, _: &str, _: &str, _: &str) -> Result<(), DirectoryError> {
        self.check()?;
        self.purged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Certificate authority fake
// ============================================================================

/// [`CertificateAuthority`] that answers challenges through the given solver and signs
/// certificates locally.
pub struct FakeAuthority {
    pub registrations: AtomicUsize,
    pub obtains: AtomicUsize,
    pub presented: Mutex<Vec<ChallengeRequest>>,
    /// Validity of issued certificates
    pub validity_days: i64,
    /// Signalled when `obtain` starts
    pub entered: Arc<Notify>,
    /// When set, `obtain` waits for this before completing
    pub release: Option<Arc<Notify>>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self {
            registrations: AtomicUsize::new(0),
            obtains: AtomicUsize::new(0),
            presented: Mutex::new(Vec::new()),
            validity_days: 90,
            entered: Arc::new(Notify::new()),
            release: None,
        }
    }

    /// An authority whose `obtain` blocks until `release` is notified.
    pub fn gated(release: Arc<Notify>) -> Self {
        Self {
            release: Some(release),
            ..Self::new()
        }
    }

    pub fn obtain_calls(&self) -> usize {
        self.obtains.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateAuthority for FakeAuthority {
    async fn register(&self, settings: &AccountSettings) -> Result<AcmeAccount, AcmeError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        let key = KeyPair::generate().map_err(|e| AcmeError::AccountCreation(e.to_string()))?;
        Ok(AcmeAccount {
            email: settings.email.clone(),
            directory_url: settings.directory_url.clone(),
            registration: r#"{"id":"https://ca.test/acct/1"}"#.to_string(),
            private_key_pem: key.serialize_pem(),
        })
    }

    async fn obtain(
        &self,
        _account: &AcmeAccount,
        domains: &[String],
        solver: Arc<dyn ChallengeSolver>,
        _timeout: Duration,
    ) -> Result<IssuedCertificate, AcmeError> {
        let n = self.obtains.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(release) = &self.release {
            release.notified().await;
        }

        for domain in domains {
            let token = format!("token-{n}");
            let challenge = ChallengeRequest {
                identifier: domain.trim_start_matches("*.").to_string(),
                key_authorization: format!("{token}.thumbprint"),
                token,
                dns_value: format!("dns-value-{n}"),
            };
            solver.present(&challenge).await?;
            self.presented.lock().push(challenge.clone());
            solver.clean_up(&challenge).await?;
        }

        Ok(self_signed(domains, self.validity_days))
    }
}

/// A self-signed certificate for `names` expiring `days` from now.
pub fn self_signed(names: &[String], days: i64) -> IssuedCertificate {
    let mut params = CertificateParams::new(names.to_vec()).unwrap();
    let start = Utc::now() - chrono::Duration::days(1);
    let end = Utc::now() + chrono::Duration::days(days);
    params.not_before = rcgen::date_time_ymd(start.year(), start.month() as u8, start.day() as u8);
    params.not_after = rcgen::date_time_ymd(end.year(), end.month() as u8, end.day() as u8);
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    IssuedCertificate {
        certificate_pem: cert.pem(),
        private_key_pem: key.serialize_pem(),
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn config_map(document: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(CONFIG_MAP_NAME.to_string()),
            namespace: Some(NS.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            CONFIG_MAP_KEY.to_string(),
            document.to_string(),
        )])),
        ..Default::default()
    }
}

pub fn domain_secret(domain: &str, token: &str, state: Option<DnsMode>) -> Secret {
    DomainState {
        domain: domain.to_string(),
        token: token.to_string(),
        state,
    }
    .to_secret(NS)
}

pub fn managed_ingress(namespace: &str, name: &str, hosts: &[&str], ip: Option<&str>) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_LABEL.to_string(),
                MANAGED_LABEL_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(
                hosts
                    .iter()
                    .map(|h| IngressRule {
                        host: Some((*h).to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: ip.map(|ip| IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(vec![IngressLoadBalancerIngress {
                    ip: Some(ip.to_string()),
                    ..Default::default()
                }]),
            }),
        }),
    }
}

pub fn with_tls(mut ingress: Ingress, hosts: &[&str], secret_name: &str) -> Ingress {
    if let Some(spec) = ingress.spec.as_mut() {
        spec.tls = Some(vec![IngressTLS {
            hosts: Some(hosts.iter().map(|h| (*h).to_string()).collect()),
            secret_name: Some(secret_name.to_string()),
        }]);
    }
    ingress
}

pub fn lb_address() -> IngressLoadBalancerIngress {
    IngressLoadBalancerIngress {
        ip: Some(LB_IP.to_string()),
        ..Default::default()
    }
}

/// Everything a test needs to drive the reconcilers.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<FakeDirectory>,
    pub authority: Arc<FakeAuthority>,
    pub certificates: Arc<CertificateManager>,
    pub ctx: Context,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new(store: MemoryStore, directory: Arc<FakeDirectory>, authority: FakeAuthority) -> Self {
        Self::with_settings(store, directory, authority, test_settings())
    }

    pub fn with_settings(
        store: MemoryStore,
        directory: Arc<FakeDirectory>,
        authority: FakeAuthority,
        settings: CertificateManagerSettings,
    ) -> Self {
        let store = Arc::new(store);
        let authority = Arc::new(authority);
        let cancel = CancellationToken::new();
        let certificates = Arc::new(CertificateManager::new(
            store.clone(),
            directory.clone(),
            authority.clone(),
            settings,
            cancel.clone(),
        ));
        let ctx = Context::new(store.clone(), directory.clone(), certificates.clone(), NS);
        Self {
            store,
            directory,
            authority,
            certificates,
            ctx,
            cancel,
        }
    }
}

pub fn test_settings() -> CertificateManagerSettings {
    CertificateManagerSettings {
        namespace: NS.to_string(),
        challenge_timeout: Duration::from_secs(5),
        http01_ready_timeout: Duration::from_secs(2),
        http01_poll_interval: Duration::from_millis(10),
        http01_selector: BTreeMap::from([("app".to_string(), "clusterdomain".to_string())]),
    }
}
