// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster object store access.
//!
//! Every handler in this crate reads and writes cluster state through the
//! [`ObjectStore`] trait rather than a concrete `kube::Client`. Two implementations
//! are provided:
//!
//! - [`KubeStore`] talks to the Kubernetes API server. Every call is wrapped in
//!   [`retry_api_call`] so transient failures (429, 5xx, connection errors) are
//!   retried with exponential backoff.
//! - [`MemoryStore`] keeps objects in process memory and enforces the same
//!   optimistic-concurrency rules. It backs the test suite.
//!
//! # Compare-and-update
//!
//! Updates carry the `resourceVersion` of the object that was read. A write against a
//! stale version fails with [`StoreError::Conflict`]; the reconcile engine then
//! re-runs the handler against fresh state.

pub mod memory;

pub use memory::MemoryStore;

use crate::reconcilers::retry::retry_api_call;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Errors returned by an [`ObjectStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object changed since it was read (stale `resourceVersion`)
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        /// Object kind
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// An object with the same name already exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Object kind
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The object to update does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind
        kind: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The object is missing `metadata.name` or `metadata.namespace`
    #[error("{kind} is missing metadata.{field}")]
    MissingMetadata {
        /// Object kind
        kind: &'static str,
        /// Missing field
        field: &'static str,
    },

    /// Any other API failure
    #[error(transparent)]
    Kube(#[from] anyhow::Error),
}

impl StoreError {
    /// Returns true if this error is an optimistic-concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Capability set over the cluster objects this controller touches.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a secret, `Ok(None)` when it does not exist.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    /// Create a secret in its `metadata.namespace`.
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Replace a secret, failing with [`StoreError::Conflict`] on a stale `resourceVersion`.
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Delete a secret. Deleting a missing secret succeeds.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// List secrets matching a label selector, across all namespaces when `namespace` is `None`.
    async fn list_secrets(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Secret>, StoreError>;

    /// Get a config map, `Ok(None)` when it does not exist.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError>;

    /// Get an ingress, `Ok(None)` when it does not exist.
    async fn get_ingress(&self, namespace: &str, name: &str)
        -> Result<Option<Ingress>, StoreError>;

    /// List ingresses matching a label selector, across all namespaces when `namespace` is `None`.
    async fn list_ingresses(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Ingress>, StoreError>;

    /// Create an ingress in its `metadata.namespace`.
    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, StoreError>;

    /// Replace an ingress, failing with [`StoreError::Conflict`] on a stale `resourceVersion`.
    async fn update_ingress(&self, ingress: &Ingress) -> Result<Ingress, StoreError>;

    /// Delete an ingress. Deleting a missing ingress succeeds.
    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Create a service in its `metadata.namespace`.
    async fn create_service(&self, service: &Service) -> Result<Service, StoreError>;

    /// Delete a service. Deleting a missing service succeeds.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// List all cluster nodes.
    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Wrap a Kubernetes client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.api(Some(namespace));
        let op = format!("get {} {namespace}/{name}", kind_of::<K>());
        Ok(retry_api_call(|| async { api.get_opt(name).await }, &op).await?)
    }

    async fn list<K>(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.api(namespace);
        let params = ListParams::default().labels(label_selector);
        let op = format!("list {} ({label_selector})", kind_of::<K>());
        let list = retry_api_call(|| async { api.list(&params).await }, &op).await?;
        Ok(list.items)
    }

    async fn create<K>(&self, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let (namespace, name) = identity(obj)?;
        let api: Api<K> = self.api(Some(&namespace));
        let op = format!("create {} {namespace}/{name}", kind_of::<K>());
        retry_api_call(
            || async { api.create(&PostParams::default(), obj).await },
            &op,
        )
        .await
        .map_err(|e| {
            if api_error_code(&e) == Some(409) {
                StoreError::AlreadyExists {
                    kind: kind_of::<K>(),
                    namespace: namespace.clone(),
                    name: name.clone(),
                }
            } else {
                StoreError::Kube(e)
            }
        })
    }

    async fn replace<K>(&self, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let (namespace, name) = identity(obj)?;
        let api: Api<K> = self.api(Some(&namespace));
        let op = format!("replace {} {namespace}/{name}", kind_of::<K>());
        retry_api_call(
            || async { api.replace(&name, &PostParams::default(), obj).await },
            &op,
        )
        .await
        .map_err(|e| match api_error_code(&e) {
            Some(409) => StoreError::Conflict {
                kind: kind_of::<K>(),
                namespace: namespace.clone(),
                name: name.clone(),
            },
            Some(404) => StoreError::NotFound {
                kind: kind_of::<K>(),
                namespace: namespace.clone(),
                name: name.clone(),
            },
            _ => StoreError::Kube(e),
        })
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.api(Some(namespace));
        let op = format!("delete {} {namespace}/{name}", kind_of::<K>());
        match retry_api_call(
            || async { api.delete(name, &DeleteParams::default()).await },
            &op,
        )
        .await
        {
            Ok(_) => Ok(()),
            Err(e) if api_error_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.get(namespace, name).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.create(secret).await
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.replace(secret).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delete::<Secret>(namespace, name).await
    }

    async fn list_secrets(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Secret>, StoreError> {
        self.list(namespace, label_selector).await
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError> {
        self.get(namespace, name).await
    }

    async fn get_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Ingress>, StoreError> {
        self.get(namespace, name).await
    }

    async fn list_ingresses(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Ingress>, StoreError> {
        self.list(namespace, label_selector).await
    }

    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        self.create(ingress).await
    }

    async fn update_ingress(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        self.replace(ingress).await
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delete::<Ingress>(namespace, name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        self.create(service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delete::<Service>(namespace, name).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let params = ListParams::default();
        let list = retry_api_call(|| async { api.list(&params).await }, "list nodes").await?;
        Ok(list.items)
    }
}

/// Kind name of a resource type, for error messages and logs.
pub(crate) fn kind_of<K>() -> &'static str
where
    K: Resource,
    <K as Resource>::DynamicType: Default,
{
    match K::kind(&K::DynamicType::default()).as_ref() {
        "Secret" => "Secret",
        "ConfigMap" => "ConfigMap",
        "Ingress" => "Ingress",
        "Service" => "Service",
        "Node" => "Node",
        _ => "object",
    }
}

/// `(namespace, name)` of an object about to be written.
pub(crate) fn identity<K>(obj: &K) -> Result<(String, String), StoreError>
where
    K: Resource,
    <K as Resource>::DynamicType: Default,
{
    let name = obj.meta().name.clone().ok_or(StoreError::MissingMetadata {
        kind: kind_of::<K>(),
        field: "name",
    })?;
    let namespace = obj.namespace().ok_or(StoreError::MissingMetadata {
        kind: kind_of::<K>(),
        field: "namespace",
    })?;
    Ok((namespace, name))
}

/// HTTP status of the Kubernetes API error wrapped in `err`, if any.
fn api_error_code(err: &anyhow::Error) -> Option<u16> {
    match err.downcast_ref::<kube::Error>() {
        Some(kube::Error::Api(api_err)) => Some(api_err.code),
        _ => None,
    }
}
