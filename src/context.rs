// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every reconciler receives an `Arc<Context>` holding the collaborators it talks to:
//! - the cluster object store
//! - the DNS directory client
//! - the certificate manager (which owns the in-flight issuance set)
//!
//! Nothing here is process-global, so tests build a context around a
//! [`MemoryStore`](crate::store::MemoryStore) and fakes.

use crate::acme::CertificateManager;
use crate::dns::client::DirectoryApi;
use crate::store::ObjectStore;
use std::sync::Arc;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Cluster object store
    pub store: Arc<dyn ObjectStore>,

    /// DNS directory client
    pub directory: Arc<dyn DirectoryApi>,

    /// ACME account and certificate orchestration
    pub certificates: Arc<CertificateManager>,

    /// Namespace holding the feature config map and the controller's secrets
    pub namespace: String,
}

impl Context {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        directory: Arc<dyn DirectoryApi>,
        certificates: Arc<CertificateManager>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory,
            certificates,
            namespace: namespace.into(),
        }
    }
}
