// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate inspection, renewal policy, and TLS secret layout.

use super::authority::IssuedCertificate;
use super::AcmeError;
use crate::constants::{
    CERT_RENEWAL_THRESHOLD_DAYS, SECRET_TYPE_TLS, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY,
};
use crate::labels::{
    ACCOUNT_HASH_ANNOTATION, CERT_NOT_AFTER_ANNOTATION, CERT_NOT_BEFORE_ANNOTATION,
    DOMAIN_ANNOTATION, K8S_MANAGED_BY, MANAGED_BY_CLUSTERDOMAIN, MANAGED_LABEL,
    MANAGED_LABEL_VALUE,
};
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

/// Fields of a leaf certificate the controller cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
}

impl CertificateInfo {
    /// True if the certificate stays valid for longer than the renewal threshold.
    #[must_use]
    pub fn is_still_valid(&self, now: DateTime<Utc>) -> bool {
        self.not_after - now > chrono::Duration::days(CERT_RENEWAL_THRESHOLD_DAYS)
    }

    /// True if one of the DNS names matches `host`, honouring single-label wildcards.
    #[must_use]
    pub fn covers_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.dns_names.iter().any(|name| {
            let name = name.to_ascii_lowercase();
            match name.strip_prefix("*.") {
                Some(base) => host
                    .split_once('.')
                    .is_some_and(|(label, rest)| !label.is_empty() && rest == base),
                None => name == host,
            }
        })
    }
}

/// Parse the first certificate of a PEM chain.
///
/// # Errors
///
/// Returns [`AcmeError::CertificateParse`] if the PEM or DER is invalid.
pub fn parse_certificate(pem: &[u8]) -> Result<CertificateInfo, AcmeError> {
    let (_, pem) = parse_x509_pem(pem).map_err(|e| AcmeError::CertificateParse(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| AcmeError::CertificateParse(e.to_string()))?;

    let validity = cert.validity();
    let not_before = timestamp(validity.not_before.timestamp())?;
    let not_after = timestamp(validity.not_after.timestamp())?;

    let dns_names = match cert.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some((*dns).to_string()),
                _ => None,
            })
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => return Err(AcmeError::CertificateParse(e.to_string())),
    };

    Ok(CertificateInfo {
        not_before,
        not_after,
        dns_names,
    })
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AcmeError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AcmeError::CertificateParse(format!("timestamp {secs} out of range")))
}

/// Certificate stored in a TLS secret, if any.
///
/// # Errors
///
/// Returns [`AcmeError::CertificateParse`] if `tls.crt` is missing or invalid.
pub fn certificate_from_secret(secret: &Secret) -> Result<CertificateInfo, AcmeError> {
    let pem = secret
        .data
        .as_ref()
        .and_then(|d| d.get(TLS_CERT_KEY))
        .ok_or_else(|| {
            AcmeError::CertificateParse(format!(
                "secret {}/{} has no {TLS_CERT_KEY}",
                secret.metadata.namespace.as_deref().unwrap_or_default(),
                secret.metadata.name.as_deref().unwrap_or_default()
            ))
        })?;
    parse_certificate(&pem.0)
}

/// Value of `key` in the secret's annotations.
#[must_use]
pub fn annotation<'a>(secret: &'a Secret, key: &str) -> Option<&'a str> {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Whether the certificate in `secret` must be re-issued.
///
/// True when the account settings changed since issuance, the certificate cannot be
/// parsed, or it expires within the renewal threshold.
#[must_use]
pub fn must_renew(secret: &Secret, account_hash: &str, now: DateTime<Utc>) -> bool {
    let domain = annotation(secret, DOMAIN_ANNOTATION).unwrap_or_default();

    if annotation(secret, ACCOUNT_HASH_ANNOTATION) != Some(account_hash) {
        info!(%domain, "ACME account settings changed, certificate must be renewed");
        return true;
    }

    match certificate_from_secret(secret) {
        Ok(cert) if cert.is_still_valid(now) => {
            debug!(%domain, not_after = %cert.not_after, "Certificate is still valid");
            false
        }
        Ok(cert) => {
            info!(%domain, not_after = %cert.not_after, "Certificate expires soon and must be renewed");
            true
        }
        Err(e) => {
            warn!(%domain, error = %e, "Stored certificate is unreadable and must be renewed");
            true
        }
    }
}

/// `*.<domain>` for a leading-dot or bare domain.
#[must_use]
pub fn wildcard_domain(domain: &str) -> String {
    format!("*.{}", domain.trim_start_matches('.'))
}

/// Build the TLS secret holding `issued`.
///
/// # Errors
///
/// Returns [`AcmeError::CertificateParse`] if the issued chain cannot be parsed.
pub fn certificate_to_secret(
    issued: &IssuedCertificate,
    domain: &str,
    account_hash: &str,
    namespace: &str,
    name: &str,
) -> Result<Secret, AcmeError> {
    let info = parse_certificate(issued.certificate_pem.as_bytes())?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels()),
            annotations: Some(BTreeMap::from([
                (DOMAIN_ANNOTATION.to_string(), domain.to_string()),
                (ACCOUNT_HASH_ANNOTATION.to_string(), account_hash.to_string()),
                (
                    CERT_NOT_BEFORE_ANNOTATION.to_string(),
                    info.not_before.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    CERT_NOT_AFTER_ANNOTATION.to_string(),
                    info.not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
            ])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (
                TLS_CERT_KEY.to_string(),
                ByteString(issued.certificate_pem.clone().into_bytes()),
            ),
            (
                TLS_PRIVATE_KEY_KEY.to_string(),
                ByteString(issued.private_key_pem.clone().into_bytes()),
            ),
        ])),
        type_: Some(SECRET_TYPE_TLS.to_string()),
        ..Default::default()
    })
}

/// Copy of `source` under a new name, keeping its certificate data and annotations.
#[must_use]
pub fn copy_certificate_secret(source: &Secret, domain: &str, namespace: &str, name: &str) -> Secret {
    let mut annotations = source.metadata.annotations.clone().unwrap_or_default();
    annotations.insert(DOMAIN_ANNOTATION.to_string(), domain.to_string());

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels()),
            annotations: Some(annotations),
            ..Default::default()
        },
        data: source.data.clone(),
        type_: source.type_.clone(),
        ..Default::default()
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_LABEL.to_string(), MANAGED_LABEL_VALUE.to_string()),
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_CLUSTERDOMAIN.to_string(),
        ),
    ])
}

#[cfg(test)]
#[path = "certs_tests.rs"]
mod certs_tests;
