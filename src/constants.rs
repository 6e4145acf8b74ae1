// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the clusterdomain controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Object Names
// ============================================================================

/// Default namespace the controller runs in and stores its state objects in
pub const DEFAULT_NAMESPACE: &str = "acorn-system";

/// Name of the `ConfigMap` holding the feature configuration
pub const CONFIG_MAP_NAME: &str = "clusterdomain-config";

/// Key inside the feature `ConfigMap` that holds the JSON configuration document
pub const CONFIG_MAP_KEY: &str = "config";

/// Name of the secret holding the reserved domain and its directory token
pub const DNS_SECRET_NAME: &str = "clusterdomain-dns";

/// Name of the secret holding the ACME account
pub const ACME_ACCOUNT_SECRET_NAME: &str = "clusterdomain-acme-account";

/// Name of the secret holding the wildcard certificate for the reserved domain
pub const WILDCARD_TLS_SECRET_NAME: &str = "clusterdomain-wildcard-tls";

// ============================================================================
// Secret Data Keys
// ============================================================================

/// Domain key in the DNS secret
pub const DNS_SECRET_DOMAIN_KEY: &str = "domain";

/// Token key in the DNS secret
pub const DNS_SECRET_TOKEN_KEY: &str = "token";

/// Email key in the ACME account secret
pub const ACCOUNT_EMAIL_KEY: &str = "email";

/// PEM private key in the ACME account secret
pub const ACCOUNT_PRIVATE_KEY_KEY: &str = "privateKey";

/// JSON registration in the ACME account secret
pub const ACCOUNT_REGISTRATION_KEY: &str = "registration";

/// CA directory URL in the ACME account secret
pub const ACCOUNT_URL_KEY: &str = "url";

/// Certificate chain key of a `kubernetes.io/tls` secret
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Private key of a `kubernetes.io/tls` secret
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Secret type for TLS secrets
pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";

// ============================================================================
// Feature Defaults
// ============================================================================

/// Default endpoint of the managed DNS directory service
pub const DEFAULT_DNS_ENDPOINT: &str = "https://oss-dns.acrn.io/v1";

/// Cluster domain used when nothing else applies (wildcard resolving to 127.0.0.1)
pub const LOCAL_CLUSTER_DOMAIN: &str = ".local.on-acorn.io";

/// Email used for staging ACME accounts when none is configured
pub const DEFAULT_ACME_EMAIL: &str = "staging-certs@acorn.io";

/// Let's Encrypt production directory URL
pub const LETSENCRYPT_PRODUCTION_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory URL
pub const LETSENCRYPT_STAGING_URL: &str =
    "https://acme-staging-v02.api.letsencrypt.org/directory";

// ============================================================================
// Timing Constants
// ============================================================================

/// Certificates expiring within this many days are renewed
pub const CERT_RENEWAL_THRESHOLD_DAYS: i64 = 7;

/// Default outer interval of the DNS renew-and-sync daemon (24 hours)
pub const DEFAULT_DNS_RENEW_INTERVAL_SECS: u64 = 86_400;

/// Default bound for DNS-01 challenge validation (5 minutes)
pub const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 300;

/// Default bound for the HTTP-01 ingress to receive an address (1 minute)
pub const DEFAULT_HTTP01_READY_TIMEOUT_SECS: u64 = 60;

/// Poll interval while waiting for the HTTP-01 ingress to receive an address
pub const HTTP01_READY_POLL_INTERVAL_SECS: u64 = 2;

/// Default timeout for a single directory HTTP request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Daemon backoff: initial interval between attempts (1 second)
pub const DAEMON_BACKOFF_INITIAL_SECS: u64 = 1;

/// Daemon backoff: multiplier applied after every failed attempt
pub const DAEMON_BACKOFF_FACTOR: f64 = 2.0;

/// Daemon backoff: number of attempts before giving up
pub const DAEMON_BACKOFF_STEPS: u32 = 10;

/// Daemon backoff: maximum interval between attempts (5 minutes)
pub const DAEMON_BACKOFF_CAP_SECS: u64 = 300;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration while a certificate issuance is running elsewhere
pub const ISSUANCE_IN_PROGRESS_REQUEUE_SECS: u64 = 15;

/// Requeue duration after a successful reconciliation (5 minutes)
pub const RECONCILE_REQUEUE_SECS: u64 = 300;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default bind address for the Prometheus metrics HTTP server
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

// ============================================================================
// ACME Challenge Constants
// ============================================================================

/// Record label used for DNS-01 challenges
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// Path prefix served for HTTP-01 challenges
pub const HTTP01_CHALLENGE_PATH: &str = "/.well-known/acme-challenge/";

/// Name prefix of the temporary Service/Ingress created for HTTP-01 challenges
pub const HTTP01_OBJECT_PREFIX: &str = "acme-http01-";

/// Service port exposed by the temporary HTTP-01 Service
pub const HTTP01_SERVICE_PORT: i32 = 80;

/// Pod label the temporary HTTP-01 Service selects by default (the controller's own pods)
pub const DEFAULT_HTTP01_SELECTOR_KEY: &str = "app";
pub const DEFAULT_HTTP01_SELECTOR_VALUE: &str = "clusterdomain";
/// `--http01-selector` default, `key=value` form of the two above
pub const DEFAULT_HTTP01_SELECTOR: &str = "app=clusterdomain";
