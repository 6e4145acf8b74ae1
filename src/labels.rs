// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and clusterdomain-specific
//! labels/annotations to ensure consistency across all objects the controller
//! reads and writes.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Value for `app.kubernetes.io/managed-by` on objects created by this controller
pub const MANAGED_BY_CLUSTERDOMAIN: &str = "clusterdomain";

/// Component value for temporary HTTP-01 challenge objects
pub const COMPONENT_ACME_HTTP01: &str = "acme-http01";

// ============================================================================
// clusterdomain-Specific Labels
// ============================================================================

/// Label marking objects (ingresses, secrets) this controller manages
pub const MANAGED_LABEL: &str = "clusterdomain.firestoned.io/managed";

/// Value of [`MANAGED_LABEL`] on managed objects
pub const MANAGED_LABEL_VALUE: &str = "true";

// ============================================================================
// clusterdomain-Specific Annotations
// ============================================================================

/// Annotation on the DNS secret recording the last applied DNS feature state
pub const DNS_STATE_ANNOTATION: &str = "clusterdomain.firestoned.io/dns-state";

/// Annotation on an ingress carrying the hash of the records last pushed to the directory
pub const DNS_HASH_ANNOTATION: &str = "clusterdomain.firestoned.io/dns-hash";

/// Annotation on certificate secrets naming the domain the certificate was issued for
pub const DOMAIN_ANNOTATION: &str = "clusterdomain.firestoned.io/domain";

/// Annotation on certificate and account secrets carrying the ACME account settings hash
pub const ACCOUNT_HASH_ANNOTATION: &str = "clusterdomain.firestoned.io/acme-account-hash";

/// Annotation on certificate secrets carrying the certificate's `notBefore` (RFC 3339)
pub const CERT_NOT_BEFORE_ANNOTATION: &str = "clusterdomain.firestoned.io/cert-not-before";

/// Annotation on certificate secrets carrying the certificate's `notAfter` (RFC 3339)
pub const CERT_NOT_AFTER_ANNOTATION: &str = "clusterdomain.firestoned.io/cert-not-after";

/// Label selector string matching managed objects
#[must_use]
pub fn managed_selector() -> String {
    format!("{MANAGED_LABEL}={MANAGED_LABEL_VALUE}")
}
