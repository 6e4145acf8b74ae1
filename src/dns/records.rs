// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Translation of ingress load-balancer state into directory record requests.
//!
//! Only rule hosts under the managed domain are translated; hosts under any other
//! domain are left alone so custom domains can coexist with the managed one.
//!
//! # Selection
//!
//! 1. If the load balancer reports external hostnames, each qualifying name gets a
//!    `CNAME` to all of them. A lone `localhost` hostname cannot be a CNAME target, so
//!    it becomes an `A` record for `127.0.0.1` instead.
//! 2. Otherwise each qualifying name gets an `A` record with every IPv4 address and an
//!    `AAAA` record with every IPv6 address, when present.
//! 3. No load-balancer state means no records.
//!
//! # Hash
//!
//! The returned hash covers the domain, the sorted rule hosts, and the sorted record
//! values. It does not depend on the order in which hosts or addresses are listed, so
//! an unchanged ingress always produces the same hash.

use super::types::{RecordRequest, RecordType};
use k8s_openapi::api::networking::v1::Ingress;
use sha2::{Digest, Sha256};
use std::net::IpAddr;

const LOCALHOST: &str = "localhost";
const LOCALHOST_IPV4: &str = "127.0.0.1";

/// Compute the record requests for `ingress` under `domain`, plus the content hash.
///
/// # Arguments
///
/// * `domain` - managed domain with a leading dot (e.g. `.abc.oss-acorn.io`)
/// * `ingress` - ingress whose rule hosts and load-balancer status are translated
///
/// # Example
///
/// ```
/// use clusterdomain::dns::{to_record_requests_and_hash, RecordType};
/// use k8s_openapi::api::networking::v1::{
///     Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec,
///     IngressStatus,
/// };
///
/// let ingress = Ingress {
///     spec: Some(IngressSpec {
///         rules: Some(vec![IngressRule {
///             host: Some("app.foo.com".to_string()),
///             ..Default::default()
///         }]),
///         ..Default::default()
///     }),
///     status: Some(IngressStatus {
///         load_balancer: Some(IngressLoadBalancerStatus {
///             ingress: Some(vec![IngressLoadBalancerIngress {
///                 ip: Some("127.0.0.1".to_string()),
///                 ..Default::default()
///             }]),
///         }),
///     }),
///     ..Default::default()
/// };
///
/// let (records, _hash) = to_record_requests_and_hash(".foo.com", &ingress);
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].name, "app");
/// assert_eq!(records[0].record_type, RecordType::A);
/// ```
#[must_use]
pub fn to_record_requests_and_hash(domain: &str, ingress: &Ingress) -> (Vec<RecordRequest>, String) {
    let hosts = rule_hosts(ingress);

    let mut names: Vec<String> = Vec::new();
    for host in &hosts {
        if let Some(name) = host.strip_suffix(domain).filter(|n| !n.is_empty()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    let mut ipv4 = Vec::new();
    let mut ipv6 = Vec::new();
    let mut hostnames = Vec::new();
    for lb in load_balancer_entries(ingress) {
        if let Some(hostname) = lb.hostname.as_deref().filter(|h| !h.is_empty()) {
            hostnames.push(hostname.to_string());
        }
        if let Some(ip) = lb.ip.as_deref().filter(|ip| !ip.is_empty()) {
            match ip.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => ipv4.push(ip.to_string()),
                Ok(IpAddr::V6(_)) => ipv6.push(ip.to_string()),
                Err(_) => {}
            }
        }
    }

    let mut records = Vec::new();
    for name in &names {
        if !hostnames.is_empty() {
            if hostnames.len() == 1 && hostnames[0] == LOCALHOST {
                records.push(record(name, RecordType::A, vec![LOCALHOST_IPV4.to_string()]));
            } else {
                records.push(record(name, RecordType::Cname, hostnames.clone()));
            }
            continue;
        }
        if !ipv4.is_empty() {
            records.push(record(name, RecordType::A, ipv4.clone()));
        }
        if !ipv6.is_empty() {
            records.push(record(name, RecordType::Aaaa, ipv6.clone()));
        }
    }

    let hash = sync_hash(domain, &hosts, &records);
    (records, hash)
}

fn record(name: &str, record_type: RecordType, values: Vec<String>) -> RecordRequest {
    RecordRequest {
        name: name.to_string(),
        record_type,
        values,
    }
}

fn rule_hosts(ingress: &Ingress) -> Vec<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_ref())
        .map(|rules| {
            rules
                .iter()
                .filter_map(|r| r.host.clone())
                .filter(|h| !h.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn load_balancer_entries(
    ingress: &Ingress,
) -> &[k8s_openapi::api::networking::v1::IngressLoadBalancerIngress] {
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_deref())
        .unwrap_or_default()
}

/// True once the ingress has at least one load-balancer address.
#[must_use]
pub fn has_load_balancer_address(ingress: &Ingress) -> bool {
    !load_balancer_entries(ingress).is_empty()
}

/// SHA-256 over the domain, sorted hosts, and sorted record values, newline separated.
fn sync_hash(domain: &str, hosts: &[String], records: &[RecordRequest]) -> String {
    let mut hosts: Vec<&str> = hosts.iter().map(String::as_str).collect();
    hosts.sort_unstable();

    let mut values: Vec<&str> = records
        .iter()
        .flat_map(|r| r.values.iter().map(String::as_str))
        .collect();
    values.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    for part in hosts.into_iter().chain(values) {
        hasher.update(b"\n");
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod records_tests;
