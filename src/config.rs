// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Feature configuration.
//!
//! The controller is configured through a JSON document stored under the `config` key
//! of the `clusterdomain-config` `ConfigMap` in the controller namespace:
//!
//! ```json
//! {
//!   "clusterDomains": [".example.com"],
//!   "dns": "auto",
//!   "dnsEndpoint": "https://oss-dns.acrn.io/v1",
//!   "letsEncrypt": "staging",
//!   "letsEncryptEmail": "ops@example.com",
//!   "letsEncryptTOSAgree": true
//! }
//! ```
//!
//! Every key is optional. [`complete`] fills in defaults, folds the reserved managed
//! domain into the cluster domains when managed DNS is in use, and validates the
//! Let's Encrypt settings.

use crate::constants::{CONFIG_MAP_KEY, CONFIG_MAP_NAME, DEFAULT_DNS_ENDPOINT, LOCAL_CLUSTER_DOMAIN};
use crate::dns::state::load_domain_state;
use crate::store::ObjectStore;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Errors produced while parsing or completing the feature configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The `config` key is not valid JSON
    #[error("invalid feature configuration: {0}")]
    InvalidDocument(String),

    /// A mode field carries an unknown value
    #[error("invalid value '{value}' for {field}, expected one of: {expected}")]
    InvalidMode {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
        /// Accepted values
        expected: &'static str,
    },

    /// `dnsEndpoint` does not parse as a URL
    #[error("invalid dnsEndpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Offending endpoint
        endpoint: String,
        /// Parse failure
        reason: String,
    },

    /// Production Let's Encrypt selected without an email address
    #[error("letsEncryptEmail is required when letsEncrypt is set to production")]
    MissingEmail,

    /// Production Let's Encrypt selected without agreeing to the terms of service
    #[error("letsEncryptTOSAgree must be true when letsEncrypt is set to production")]
    TermsNotAgreed,
}

/// Managed DNS feature mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DnsMode {
    Enabled,
    #[default]
    Auto,
    Disabled,
}

impl DnsMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Auto => "auto",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for DnsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enabled" => Ok(Self::Enabled),
            "auto" => Ok(Self::Auto),
            "disabled" => Ok(Self::Disabled),
            _ => Err(ConfigError::InvalidMode {
                field: "dns",
                value: s.to_string(),
                expected: "enabled, auto, disabled",
            }),
        }
    }
}

impl fmt::Display for DnsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Let's Encrypt feature mode.
///
/// `Enabled` uses the production CA; `production` is accepted as an alias.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LetsEncryptMode {
    Enabled,
    #[default]
    Staging,
    Disabled,
}

impl LetsEncryptMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Staging => "staging",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for LetsEncryptMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enabled" | "production" => Ok(Self::Enabled),
            "staging" => Ok(Self::Staging),
            "disabled" => Ok(Self::Disabled),
            _ => Err(ConfigError::InvalidMode {
                field: "letsEncrypt",
                value: s.to_string(),
                expected: "enabled, production, staging, disabled",
            }),
        }
    }
}

impl fmt::Display for LetsEncryptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration document as written by the operator.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub cluster_domains: Vec<String>,
    pub dns: Option<String>,
    pub dns_endpoint: Option<String>,
    pub lets_encrypt: Option<String>,
    pub lets_encrypt_email: Option<String>,
    #[serde(rename = "letsEncryptTOSAgree")]
    pub lets_encrypt_tos_agree: Option<bool>,
}

impl RawConfig {
    /// Parse the JSON document stored in the config map. Empty input yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDocument`] if the document is not valid JSON.
    pub fn parse(document: &str) -> Result<Self, ConfigError> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(document).map_err(|e| ConfigError::InvalidDocument(e.to_string()))
    }

    /// Read the document out of a config map. A missing key yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDocument`] if the document is not valid JSON.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, ConfigError> {
        match config_map.data.as_ref().and_then(|d| d.get(CONFIG_MAP_KEY)) {
            Some(document) => Self::parse(document),
            None => Ok(Self::default()),
        }
    }
}

/// Completed feature configuration with defaults applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Domains under which ingress hostnames are generated, each with a leading dot
    pub cluster_domains: Vec<String>,
    pub dns: DnsMode,
    pub dns_endpoint: String,
    pub lets_encrypt: LetsEncryptMode,
    pub lets_encrypt_email: String,
    pub lets_encrypt_tos_agree: bool,
}

impl FeatureConfig {
    /// True if `domain` is one of the configured cluster domains.
    #[must_use]
    pub fn has_cluster_domain(&self, domain: &str) -> bool {
        self.cluster_domains.iter().any(|d| d == domain)
    }

    /// True if `host` falls under any configured cluster domain.
    #[must_use]
    pub fn is_cluster_host(&self, host: &str) -> bool {
        self.cluster_domains.iter().any(|d| host.ends_with(d.as_str()))
    }
}

/// Whether managed DNS should be used for the given raw settings.
///
/// DNS is used when explicitly enabled, or in `auto` mode when the operator configured
/// no cluster domains and the cluster is not a local desktop cluster.
#[must_use]
pub fn dns_in_use(mode: DnsMode, configured_domains: &[String], local_cluster: bool) -> bool {
    match mode {
        DnsMode::Enabled => true,
        DnsMode::Auto => configured_domains.is_empty() && !local_cluster,
        DnsMode::Disabled => false,
    }
}

/// Apply defaults and validation to a raw configuration.
///
/// # Arguments
///
/// * `raw` - configuration as written by the operator
/// * `reserved_domain` - domain stored in the DNS secret, if any
/// * `local_cluster` - result of [`uses_local_wildcard_domain`] for the cluster nodes
///
/// # Errors
///
/// Returns a [`ConfigError`] for unknown modes, an unparsable endpoint, or incomplete
/// production Let's Encrypt settings.
pub fn complete(
    raw: &RawConfig,
    reserved_domain: Option<&str>,
    local_cluster: bool,
) -> Result<FeatureConfig, ConfigError> {
    let dns = raw
        .dns
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<DnsMode>)
        .transpose()?
        .unwrap_or_default();
    let lets_encrypt = raw
        .lets_encrypt
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<LetsEncryptMode>)
        .transpose()?
        .unwrap_or_default();

    let dns_endpoint = raw
        .dns_endpoint
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_DNS_ENDPOINT.to_string());
    url::Url::parse(&dns_endpoint).map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: dns_endpoint.clone(),
        reason: e.to_string(),
    })?;

    let mut cluster_domains: Vec<String> = raw
        .cluster_domains
        .iter()
        .filter(|d| !d.is_empty())
        .map(|d| normalize_domain(d))
        .collect();

    if dns_in_use(dns, &cluster_domains, local_cluster) {
        if let Some(domain) = reserved_domain.filter(|d| !d.is_empty()) {
            let domain = normalize_domain(domain);
            if !cluster_domains.contains(&domain) {
                cluster_domains.push(domain);
            }
        }
    }
    if cluster_domains.is_empty() {
        cluster_domains.push(LOCAL_CLUSTER_DOMAIN.to_string());
    }

    let lets_encrypt_email = raw.lets_encrypt_email.clone().unwrap_or_default();
    let lets_encrypt_tos_agree = raw.lets_encrypt_tos_agree.unwrap_or(false);
    if lets_encrypt == LetsEncryptMode::Enabled {
        if lets_encrypt_email.is_empty() {
            return Err(ConfigError::MissingEmail);
        }
        if !lets_encrypt_tos_agree {
            return Err(ConfigError::TermsNotAgreed);
        }
    }

    Ok(FeatureConfig {
        cluster_domains,
        dns,
        dns_endpoint,
        lets_encrypt,
        lets_encrypt_email,
        lets_encrypt_tos_agree,
    })
}

/// Prefix `domain` with a dot if it lacks one.
#[must_use]
pub fn normalize_domain(domain: &str) -> String {
    if domain.starts_with('.') {
        domain.to_string()
    } else {
        format!(".{domain}")
    }
}

/// Detect local desktop clusters, which use the `127.0.0.1` wildcard domain instead of
/// managed DNS.
#[must_use]
pub fn uses_local_wildcard_domain(nodes: &[Node]) -> bool {
    if let [node] = nodes {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        let os_image = node
            .status
            .as_ref()
            .and_then(|s| s.node_info.as_ref())
            .map(|i| i.os_image.as_str())
            .unwrap_or_default();
        if name == "docker-desktop"
            || name.contains("rancher-desktop")
            || name.contains("minikube")
            || os_image.contains("Rancher Desktop")
        {
            return true;
        }
    }

    nodes.iter().any(|node| {
        node.spec
            .as_ref()
            .and_then(|s| s.provider_id.as_deref())
            .is_some_and(|id| id.starts_with("k3s://k3d"))
    })
}

/// Load and complete the feature configuration from the cluster.
///
/// A missing config map yields defaults. Nodes are only listed when the local-cluster
/// check can change the outcome.
///
/// # Errors
///
/// Returns an error if the object store cannot be read or the configuration is invalid.
pub async fn load_config(store: &dyn ObjectStore, namespace: &str) -> Result<FeatureConfig> {
    let raw = match store
        .get_config_map(namespace, CONFIG_MAP_NAME)
        .await
        .with_context(|| format!("failed to read config map {namespace}/{CONFIG_MAP_NAME}"))?
    {
        Some(cm) => RawConfig::from_config_map(&cm)?,
        None => RawConfig::default(),
    };
    complete_from_cluster(store, namespace, &raw).await
}

/// Complete `raw` using the reserved domain and nodes currently in the cluster.
///
/// # Errors
///
/// Returns an error if the object store cannot be read or the configuration is invalid.
pub async fn complete_from_cluster(
    store: &dyn ObjectStore,
    namespace: &str,
    raw: &RawConfig,
) -> Result<FeatureConfig> {
    let reserved = load_domain_state(store, namespace)
        .await?
        .map(|(_, state)| state.domain);

    let dns_mode = raw
        .dns
        .as_deref()
        .and_then(|s| s.parse::<DnsMode>().ok())
        .unwrap_or_default();
    let local_cluster = if dns_mode == DnsMode::Auto && raw.cluster_domains.is_empty() {
        let nodes = store.list_nodes().await.context("failed to list nodes")?;
        uses_local_wildcard_domain(&nodes)
    } else {
        false
    };

    let cfg = complete(raw, reserved.as_deref(), local_cluster)?;
    debug!(
        cluster_domains = ?cfg.cluster_domains,
        dns = %cfg.dns,
        lets_encrypt = %cfg.lets_encrypt,
        local_cluster,
        "Loaded feature configuration"
    );
    Ok(cfg)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
