// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # clusterdomain - Managed DNS and ACME certificates for Kubernetes ingresses
//!
//! clusterdomain is a Kubernetes controller that gives a cluster a public DNS domain from
//! an external DNS directory service, publishes records for the cluster's ingresses under
//! that domain, and obtains TLS certificates from an ACME certificate authority.
//!
//! ## Overview
//!
//! - A domain and bearer token are reserved from the directory and kept in a secret
//! - Ingress load-balancer addresses are translated into A/AAAA/CNAME records and pushed
//!   only when they change
//! - A daemon renews the domain periodically and invalidates records the directory reports
//!   as out of sync
//! - A wildcard certificate for the domain is issued over DNS-01; custom ingress hosts get
//!   certificates over HTTP-01
//!
//! ## Modules
//!
//! - [`config`] - Feature configuration loading and completion
//! - [`dns`] - Directory client, rate limiting, record translation, domain state
//! - [`acme`] - Accounts, challenges and certificate orchestration
//! - [`reconcilers`] - Reconciliation handlers
//! - [`daemon`] - Periodic renew-and-sync loop
//! - [`store`] - Cluster object store abstraction
//! - [`context`] - Shared context passed to all controllers
//!
//! ## Example
//!
//! ```rust
//! use clusterdomain::config::{complete, RawConfig};
//!
//! let raw = RawConfig::parse(r#"{"dns": "auto"}"#).unwrap();
//! let cfg = complete(&raw, Some(".abc.oss-acorn.io"), false).unwrap();
//! assert!(cfg.has_cluster_domain(".abc.oss-acorn.io"));
//! ```

pub mod acme;
pub mod config;
pub mod constants;
pub mod context;
pub mod daemon;
pub mod dns;
pub mod dns_errors;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod store;
