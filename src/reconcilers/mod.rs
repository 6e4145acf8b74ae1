// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation handlers.
//!
//! Each handler is an idempotent function of the object it is triggered by and the state
//! in the cluster. Handlers may run concurrently and more than once for the same object;
//! persisted state is written with compare-and-update and the stored hashes make repeated
//! runs with unchanged inputs side-effect free.
//!
//! # Available Reconcilers
//!
//! - [`reconcile_dns_config`] - Reserves or purges the managed domain when the feature
//!   config map changes, and provisions the wildcard certificate
//! - [`reconcile_ingress`] - Pushes an ingress's DNS records and provisions certificates
//!   for its custom TLS hosts
//! - [`reconcile_tls_secret`] - Renews managed certificates nearing expiry
//!
//! # Example: Using a Reconciler
//!
//! ```rust,no_run
//! use clusterdomain::context::Context;
//! use clusterdomain::reconcilers::reconcile_ingress;
//! use k8s_openapi::api::networking::v1::Ingress;
//!
//! async fn sync(ctx: &Context, ingress: &Ingress) -> anyhow::Result<()> {
//!     reconcile_ingress(ctx, ingress).await
//! }
//! ```

pub mod dns_config;
pub mod ingress;
pub mod retry;
pub mod tls;

pub use dns_config::{reconcile_dns_config, target_state};
pub use ingress::{
    plan_ingress_sync, reconcile_ingress, reconcile_ingress_certificates, reconcile_ingress_dns,
    IngressSyncPlan,
};
pub use tls::reconcile_tls_secret;
