// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for certificate provisioning: wildcard reuse and renewal over
//! DNS-01, in-flight deduplication, HTTP-01 issuance with temporary routing, and
//! copying certificates between namespaces.

mod common;

use clusterdomain::acme::certs::{annotation, certificate_to_secret, wildcard_domain};
use clusterdomain::acme::{AccountSettings, AcmeError, CertificateManagerSettings};
use clusterdomain::config::{complete, DnsMode, FeatureConfig, RawConfig};
use clusterdomain::constants::{TLS_CERT_KEY, WILDCARD_TLS_SECRET_NAME};
use clusterdomain::dns::state::load_domain_state;
use clusterdomain::dns::types::RecordType;
use clusterdomain::dns_errors::DirectoryError;
use clusterdomain::labels::{CERT_NOT_AFTER_ANNOTATION, DOMAIN_ANNOTATION};
use clusterdomain::reconcilers::{reconcile_dns_config, reconcile_tls_secret};
use clusterdomain::store::MemoryStore;
use common::*;
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const CUSTOM_HOST: &str = "shop.example.com";

fn staging_config() -> FeatureConfig {
    complete(&RawConfig::default(), Some(DOMAIN), false).unwrap()
}

fn account_hash(cfg: &FeatureConfig) -> String {
    AccountSettings::from_config(cfg).unwrap().hash()
}

/// A managed TLS secret for `domain` valid for `days` more days.
fn issued_secret(domain: &str, hash: &str, days: i64, namespace: &str, name: &str) -> Secret {
    let issued = self_signed(&[domain.to_string()], days);
    certificate_to_secret(&issued, domain, hash, namespace, name).unwrap()
}

fn dns_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_secret(domain_secret(DOMAIN, TOKEN, Some(DnsMode::Enabled)));
    store
}

// ============================================================================
// Wildcard certificate
// ============================================================================

#[tokio::test]
async fn test_current_wildcard_certificate_is_reused() {
    let cfg = staging_config();
    let wildcard = wildcard_domain(DOMAIN);
    let store = dns_store();
    store.insert_secret(issued_secret(
        &wildcard,
        &account_hash(&cfg),
        10,
        NS,
        WILDCARD_TLS_SECRET_NAME,
    ));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());

    h.certificates
        .ensure_wildcard_certificate(&cfg, DOMAIN, TOKEN)
        .await
        .unwrap();

    assert_eq!(h.authority.obtain_calls(), 0);
    assert_eq!(h.authority.registrations.load(Ordering::SeqCst), 0);
    assert_eq!(h.directory.create_calls(), 0);
}

#[tokio::test]
async fn test_expiring_wildcard_certificate_is_renewed_over_dns01() {
    let cfg = staging_config();
    let wildcard = wildcard_domain(DOMAIN);
    let store = dns_store();
    store.insert_secret(issued_secret(
        &wildcard,
        &account_hash(&cfg),
        3,
        NS,
        WILDCARD_TLS_SECRET_NAME,
    ));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());
    let before = h.store.secret(NS, WILDCARD_TLS_SECRET_NAME).unwrap();

    h.certificates
        .ensure_wildcard_certificate(&cfg, DOMAIN, TOKEN)
        .await
        .unwrap();

    assert_eq!(h.authority.obtain_calls(), 1);
    let after = h.store.secret(NS, WILDCARD_TLS_SECRET_NAME).unwrap();
    assert_ne!(
        annotation(&before, CERT_NOT_AFTER_ANNOTATION),
        annotation(&after, CERT_NOT_AFTER_ANNOTATION)
    );
    assert_eq!(annotation(&after, DOMAIN_ANNOTATION), Some(wildcard.as_str()));

    // The TXT record was published under the managed domain and removed afterwards
    let created = h.directory.created.lock().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0][0].name, "_acme-challenge");
    assert_eq!(created[0][0].record_type, RecordType::Txt);
    assert_eq!(
        h.directory.deleted.lock().clone(),
        vec!["_acme-challenge".to_string()]
    );
}

#[tokio::test]
async fn test_account_change_forces_wildcard_renewal() {
    let cfg = staging_config();
    let wildcard = wildcard_domain(DOMAIN);
    let store = dns_store();
    store.insert_secret(issued_secret(
        &wildcard,
        "issued-under-another-account",
        60,
        NS,
        WILDCARD_TLS_SECRET_NAME,
    ));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());

    h.certificates
        .ensure_wildcard_certificate(&cfg, DOMAIN, TOKEN)
        .await
        .unwrap();

    assert_eq!(h.authority.obtain_calls(), 1);
    assert_eq!(h.authority.registrations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_requests_issue_once() {
    let cfg = staging_config();
    let release = Arc::new(Notify::new());
    let h = Harness::new(
        dns_store(),
        FakeDirectory::reserving(DOMAIN, TOKEN),
        FakeAuthority::gated(release.clone()),
    );

    let first = {
        let certificates = h.certificates.clone();
        let cfg = cfg.clone();
        tokio::spawn(async move {
            certificates
                .ensure_wildcard_certificate(&cfg, DOMAIN, TOKEN)
                .await
        })
    };
    h.authority.entered.notified().await;

    let second = h
        .certificates
        .ensure_wildcard_certificate(&cfg, DOMAIN, TOKEN)
        .await;
    assert!(matches!(second, Err(AcmeError::IssuanceInProgress { .. })));

    release.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(h.authority.obtain_calls(), 1);
    assert!(h.certificates.in_flight().is_empty());
    assert!(h.store.secret(NS, WILDCARD_TLS_SECRET_NAME).is_some());
}

/// The token is cleared and the domain kept
async fn assert_token_cleared(h: &Harness) {
    let (_, state) = load_domain_state(h.store.as_ref(), NS).await.unwrap().unwrap();
    assert_eq!(state.domain, DOMAIN);
    assert!(state.token.is_empty());
}

#[tokio::test]
async fn test_dns01_domain_auth_failure_clears_token() {
    let store = dns_store();
    let cm = config_map(r#"{"dns": "enabled", "letsEncrypt": "staging"}"#);
    store.insert_config_map(cm.clone());
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());
    h.directory.fail_with(DirectoryError::DomainAuth);

    let err = reconcile_dns_config(&h.ctx, &cm).await.unwrap_err();

    assert!(err
        .downcast_ref::<AcmeError>()
        .is_some_and(AcmeError::is_domain_auth));
    assert_token_cleared(&h).await;
    assert!(h.store.secret(NS, WILDCARD_TLS_SECRET_NAME).is_none());
    assert!(h.certificates.in_flight().is_empty());
}

#[tokio::test]
async fn test_wildcard_renewal_domain_auth_failure_clears_token() {
    let cfg = staging_config();
    let wildcard = wildcard_domain(DOMAIN);
    let store = dns_store();
    store.insert_secret(issued_secret(
        &wildcard,
        &account_hash(&cfg),
        3,
        NS,
        WILDCARD_TLS_SECRET_NAME,
    ));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());
    h.directory.fail_with(DirectoryError::DomainAuth);
    let secret = h.store.secret(NS, WILDCARD_TLS_SECRET_NAME).unwrap();

    let err = reconcile_tls_secret(&h.ctx, &secret).await.unwrap_err();

    assert!(err
        .downcast_ref::<AcmeError>()
        .is_some_and(AcmeError::is_domain_auth));
    assert_token_cleared(&h).await;
    // The expiring certificate stays in place until a fresh token allows renewal
    let after = h.store.secret(NS, WILDCARD_TLS_SECRET_NAME).unwrap();
    assert_eq!(
        annotation(&secret, CERT_NOT_AFTER_ANNOTATION),
        annotation(&after, CERT_NOT_AFTER_ANNOTATION)
    );
}

// ============================================================================
// Custom domains over HTTP-01
// ============================================================================

#[tokio::test]
async fn test_http01_issuance_cleans_up_routing() {
    let cfg = staging_config();
    let h = Harness::new(
        MemoryStore::new().with_ingress_address(lb_address()),
        FakeDirectory::reserving(DOMAIN, TOKEN),
        FakeAuthority::new(),
    );

    h.certificates
        .ensure_domain_certificate(&cfg, CUSTOM_HOST, "app", "shop-tls")
        .await
        .unwrap();

    assert_eq!(h.authority.obtain_calls(), 1);
    let presented = h.authority.presented.lock().clone();
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].identifier, CUSTOM_HOST);

    let secret = h.store.secret("app", "shop-tls").unwrap();
    assert_eq!(annotation(&secret, DOMAIN_ANNOTATION), Some(CUSTOM_HOST));
    assert_eq!(h.store.service_count(), 0);
    assert_eq!(h.store.ingress_count(), 0);
}

#[tokio::test]
async fn test_http01_times_out_without_ingress_address() {
    let cfg = staging_config();
    let mut settings = test_settings();
    settings.http01_ready_timeout = Duration::from_millis(100);
    let h = Harness::with_settings(
        MemoryStore::new(),
        FakeDirectory::reserving(DOMAIN, TOKEN),
        FakeAuthority::new(),
        settings,
    );

    let err = h
        .certificates
        .ensure_domain_certificate(&cfg, CUSTOM_HOST, "app", "shop-tls")
        .await
        .unwrap_err();

    assert!(matches!(err, AcmeError::Timeout { .. }));
    assert_eq!(h.authority.obtain_calls(), 0);
    assert_eq!(h.store.service_count(), 0);
    assert_eq!(h.store.ingress_count(), 0);
    assert!(h.store.secret("app", "shop-tls").is_none());
    assert!(h.certificates.in_flight().is_empty());
}

#[tokio::test]
async fn test_http01_without_selector_is_refused() {
    let cfg = staging_config();
    let settings = CertificateManagerSettings {
        http01_selector: BTreeMap::new(),
        ..test_settings()
    };
    let h = Harness::with_settings(
        MemoryStore::new().with_ingress_address(lb_address()),
        FakeDirectory::reserving(DOMAIN, TOKEN),
        FakeAuthority::new(),
        settings,
    );

    let err = h
        .certificates
        .ensure_domain_certificate(&cfg, CUSTOM_HOST, "app", "shop-tls")
        .await
        .unwrap_err();

    assert!(matches!(err, AcmeError::Configuration(_)));
    assert_eq!(h.authority.obtain_calls(), 0);
    assert_eq!(h.store.service_count(), 0);
    assert_eq!(h.store.ingress_count(), 0);
}

#[tokio::test]
async fn test_http01_issuance_with_default_settings() {
    let cfg = staging_config();
    let settings = CertificateManagerSettings {
        namespace: NS.to_string(),
        http01_poll_interval: Duration::from_millis(10),
        ..CertificateManagerSettings::default()
    };
    let h = Harness::with_settings(
        MemoryStore::new().with_ingress_address(lb_address()),
        FakeDirectory::reserving(DOMAIN, TOKEN),
        FakeAuthority::new(),
        settings,
    );

    h.certificates
        .ensure_domain_certificate(&cfg, CUSTOM_HOST, "app", "shop-tls")
        .await
        .unwrap();

    assert_eq!(h.authority.obtain_calls(), 1);
    assert!(h.store.secret("app", "shop-tls").is_some());
}

#[tokio::test]
async fn test_certificate_is_copied_across_namespaces() {
    let cfg = staging_config();
    let store = MemoryStore::new();
    store.insert_secret(issued_secret(
        CUSTOM_HOST,
        &account_hash(&cfg),
        60,
        "other",
        "shop-tls",
    ));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());

    h.certificates
        .ensure_domain_certificate(&cfg, CUSTOM_HOST, "app", "shop-tls")
        .await
        .unwrap();

    assert_eq!(h.authority.obtain_calls(), 0);
    let source = h.store.secret("other", "shop-tls").unwrap();
    let copy = h.store.secret("app", "shop-tls").unwrap();
    assert_eq!(
        source.data.as_ref().and_then(|d| d.get(TLS_CERT_KEY)),
        copy.data.as_ref().and_then(|d| d.get(TLS_CERT_KEY))
    );
}

#[tokio::test]
async fn test_existing_secret_for_same_domain_is_left_alone() {
    let cfg = staging_config();
    let store = MemoryStore::new();
    store.insert_secret(issued_secret(CUSTOM_HOST, &account_hash(&cfg), 3, "app", "shop-tls"));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());

    h.certificates
        .ensure_domain_certificate(&cfg, CUSTOM_HOST, "app", "shop-tls")
        .await
        .unwrap();

    assert_eq!(h.authority.obtain_calls(), 0);
}

// ============================================================================
// Renewal of stored secrets
// ============================================================================

#[tokio::test]
async fn test_tls_secret_near_expiry_is_renewed() {
    let cfg = staging_config();
    let store = MemoryStore::new().with_ingress_address(lb_address());
    store.insert_secret(issued_secret(CUSTOM_HOST, &account_hash(&cfg), 3, "app", "shop-tls"));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());

    let secret = h.store.secret("app", "shop-tls").unwrap();
    let renewed = reconcile_tls_secret(&h.ctx, &secret).await.unwrap();

    assert!(renewed);
    assert_eq!(h.authority.obtain_calls(), 1);
    let after = h.store.secret("app", "shop-tls").unwrap();
    assert_ne!(
        annotation(&secret, CERT_NOT_AFTER_ANNOTATION),
        annotation(&after, CERT_NOT_AFTER_ANNOTATION)
    );
}

#[tokio::test]
async fn test_valid_tls_secret_is_not_renewed() {
    let cfg = staging_config();
    let store = MemoryStore::new();
    store.insert_secret(issued_secret(CUSTOM_HOST, &account_hash(&cfg), 60, "app", "shop-tls"));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());

    let secret = h.store.secret("app", "shop-tls").unwrap();
    let renewed = reconcile_tls_secret(&h.ctx, &secret).await.unwrap();

    assert!(!renewed);
    assert_eq!(h.authority.obtain_calls(), 0);
    assert_eq!(h.authority.registrations.load(Ordering::SeqCst), 0);
}

/// A reconcile working from a stale copy of an already renewed secret issues nothing
#[tokio::test]
async fn test_stale_secret_is_not_renewed_twice() {
    let cfg = staging_config();
    let hash = account_hash(&cfg);
    let store = MemoryStore::new().with_ingress_address(lb_address());
    store.insert_secret(issued_secret(CUSTOM_HOST, &hash, 3, "app", "shop-tls"));
    let h = Harness::new(store, FakeDirectory::reserving(DOMAIN, TOKEN), FakeAuthority::new());
    let stale = h.store.secret("app", "shop-tls").unwrap();

    assert!(h.certificates.renew_certificate(&cfg, &stale).await.unwrap());
    assert!(!h.certificates.renew_certificate(&cfg, &stale).await.unwrap());

    assert_eq!(h.authority.obtain_calls(), 1);
}
