// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process [`ObjectStore`] implementation.
//!
//! `MemoryStore` mirrors the API server semantics the handlers rely on:
//! `resourceVersion` is bumped on every write, updates carrying a stale version are
//! rejected, creates of an existing name are rejected, and deletes are idempotent.
//! It can also play the role of an ingress controller by stamping a load-balancer
//! address on ingresses as they are created.

use super::{identity, kind_of, ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret, Service};
use k8s_openapi::api::networking::v1::{
    Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
};
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use std::collections::BTreeMap;

type Key = (String, String);

#[derive(Default)]
struct State {
    secrets: BTreeMap<Key, Secret>,
    config_maps: BTreeMap<Key, ConfigMap>,
    ingresses: BTreeMap<Key, Ingress>,
    services: BTreeMap<Key, Service>,
    nodes: Vec<Node>,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// Thread-safe in-memory object store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    ingress_address: Option<IngressLoadBalancerIngress>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `address` to the load-balancer status of every ingress created through the store.
    #[must_use]
    pub fn with_ingress_address(mut self, address: IngressLoadBalancerIngress) -> Self {
        self.ingress_address = Some(address);
        self
    }

    /// Seed a secret, overwriting any existing object with the same name.
    pub fn insert_secret(&self, mut secret: Secret) {
        let mut state = self.state.lock();
        let key = key_of(&secret);
        secret.metadata.resource_version = Some(state.next_version());
        state.secrets.insert(key, secret);
    }

    /// Seed a config map, overwriting any existing object with the same name.
    pub fn insert_config_map(&self, mut config_map: ConfigMap) {
        let mut state = self.state.lock();
        let key = key_of(&config_map);
        config_map.metadata.resource_version = Some(state.next_version());
        state.config_maps.insert(key, config_map);
    }

    /// Seed an ingress, overwriting any existing object with the same name.
    pub fn insert_ingress(&self, mut ingress: Ingress) {
        let mut state = self.state.lock();
        let key = key_of(&ingress);
        ingress.metadata.resource_version = Some(state.next_version());
        state.ingresses.insert(key, ingress);
    }

    /// Seed a node.
    pub fn insert_node(&self, node: Node) {
        self.state.lock().nodes.push(node);
    }

    /// Current copy of a secret.
    #[must_use]
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current copy of an ingress.
    #[must_use]
    pub fn ingress(&self, namespace: &str, name: &str) -> Option<Ingress> {
        self.state
            .lock()
            .ingresses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of services currently stored.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.state.lock().services.len()
    }

    /// Number of ingresses currently stored.
    #[must_use]
    pub fn ingress_count(&self) -> usize {
        self.state.lock().ingresses.len()
    }
}

fn key_of<K: Resource>(obj: &K) -> Key {
    (
        obj.namespace().unwrap_or_default(),
        obj.meta().name.clone().unwrap_or_default(),
    )
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => labels.contains_key(term),
        })
}

fn create_in<K>(
    map: &mut BTreeMap<Key, K>,
    version: String,
    obj: &K,
) -> Result<K, StoreError>
where
    K: Resource + Clone,
    <K as Resource>::DynamicType: Default,
{
    let (namespace, name) = identity(obj)?;
    let key = (namespace, name);
    if map.contains_key(&key) {
        return Err(StoreError::AlreadyExists {
            kind: kind_of::<K>(),
            namespace: key.0,
            name: key.1,
        });
    }
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(version);
    map.insert(key, stored.clone());
    Ok(stored)
}

fn update_in<K>(
    map: &mut BTreeMap<Key, K>,
    version: String,
    obj: &K,
) -> Result<K, StoreError>
where
    K: Resource + Clone,
    <K as Resource>::DynamicType: Default,
{
    let (namespace, name) = identity(obj)?;
    let key = (namespace, name);
    let Some(current) = map.get(&key) else {
        return Err(StoreError::NotFound {
            kind: kind_of::<K>(),
            namespace: key.0,
            name: key.1,
        });
    };
    if let Some(expected) = obj.meta().resource_version.as_ref() {
        if current.meta().resource_version.as_ref() != Some(expected) {
            return Err(StoreError::Conflict {
                kind: kind_of::<K>(),
                namespace: key.0,
                name: key.1,
            });
        }
    }
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(version);
    map.insert(key, stored.clone());
    Ok(stored)
}

fn list_in<K: Resource + Clone>(
    map: &BTreeMap<Key, K>,
    namespace: Option<&str>,
    selector: &str,
) -> Vec<K> {
    map.iter()
        .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
        .filter(|(_, obj)| matches_selector(obj.labels(), selector))
        .map(|(_, obj)| obj.clone())
        .collect()
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.state.lock().secrets.get(&key(namespace, name)).cloned())
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let mut state = self.state.lock();
        let version = state.next_version();
        create_in(&mut state.secrets, version, secret)
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let mut state = self.state.lock();
        let version = state.next_version();
        update_in(&mut state.secrets, version, secret)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.state.lock().secrets.remove(&key(namespace, name));
        Ok(())
    }

    async fn list_secrets(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Secret>, StoreError> {
        Ok(list_in(&self.state.lock().secrets, namespace, label_selector))
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError> {
        Ok(self
            .state
            .lock()
            .config_maps
            .get(&key(namespace, name))
            .cloned())
    }

    async fn get_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Ingress>, StoreError> {
        Ok(self.state.lock().ingresses.get(&key(namespace, name)).cloned())
    }

    async fn list_ingresses(
        &self,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Ingress>, StoreError> {
        Ok(list_in(&self.state.lock().ingresses, namespace, label_selector))
    }

    async fn create_ingress(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        let mut ingress = ingress.clone();
        if let Some(address) = &self.ingress_address {
            ingress.status = Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(vec![address.clone()]),
                }),
            });
        }
        let mut state = self.state.lock();
        let version = state.next_version();
        create_in(&mut state.ingresses, version, &ingress)
    }

    async fn update_ingress(&self, ingress: &Ingress) -> Result<Ingress, StoreError> {
        let mut state = self.state.lock();
        let version = state.next_version();
        update_in(&mut state.ingresses, version, ingress)
    }

    async fn delete_ingress(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.state.lock().ingresses.remove(&key(namespace, name));
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        let mut state = self.state.lock();
        let version = state.next_version();
        create_in(&mut state.services, version, service)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.state.lock().services.remove(&key(namespace, name));
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.state.lock().nodes.clone())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
