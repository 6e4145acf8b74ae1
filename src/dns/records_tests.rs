// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `records.rs`

#[cfg(test)]
mod tests {
    use crate::dns::records::{has_load_balancer_address, to_record_requests_and_hash};
    use crate::dns::types::{RecordRequest, RecordType};
    use k8s_openapi::api::networking::v1::{
        Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec,
        IngressStatus,
    };

    fn ingress(hosts: &[&str], ipv4: &[&str], ipv6: &[&str], hostnames: &[&str]) -> Ingress {
        let mut lbs: Vec<IngressLoadBalancerIngress> = ipv4
            .iter()
            .chain(ipv6)
            .map(|ip| IngressLoadBalancerIngress {
                ip: Some((*ip).to_string()),
                ..Default::default()
            })
            .collect();
        lbs.extend(hostnames.iter().map(|h| IngressLoadBalancerIngress {
            hostname: Some((*h).to_string()),
            ..Default::default()
        }));

        Ingress {
            spec: Some(IngressSpec {
                rules: Some(
                    hosts
                        .iter()
                        .map(|h| IngressRule {
                            host: Some((*h).to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            status: Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus { ingress: Some(lbs) }),
            }),
            ..Default::default()
        }
    }

    fn rr(name: &str, record_type: RecordType, values: &[&str]) -> RecordRequest {
        RecordRequest {
            name: name.to_string(),
            record_type,
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    fn records(domain: &str, ing: &Ingress) -> Vec<RecordRequest> {
        to_record_requests_and_hash(domain, ing).0
    }

    #[test]
    fn test_ipv4_yields_a_record() {
        let ing = ingress(&["app.foo.com"], &["127.0.0.1"], &[], &[]);
        assert_eq!(
            records(".foo.com", &ing),
            vec![rr("app", RecordType::A, &["127.0.0.1"])]
        );
    }

    #[test]
    fn test_ipv6_yields_aaaa_record() {
        let ing = ingress(&["app.foo.com"], &[], &["::1"], &[]);
        assert_eq!(
            records(".foo.com", &ing),
            vec![rr("app", RecordType::Aaaa, &["::1"])]
        );
    }

    #[test]
    fn test_hostname_yields_cname_record() {
        let ing = ingress(&["app.foo.com"], &[], &[], &["hostname.com"]);
        assert_eq!(
            records(".foo.com", &ing),
            vec![rr("app", RecordType::Cname, &["hostname.com"])]
        );
    }

    #[test]
    fn test_host_outside_domain_is_ignored() {
        let ing = ingress(&["app.foo.com"], &["127.0.0.1"], &[], &[]);
        assert!(records(".bar.com", &ing).is_empty());
    }

    #[test]
    fn test_only_matching_hosts_are_translated() {
        let ing = ingress(&["app.foo.com", "second.bar.com"], &["127.0.0.1"], &[], &[]);
        assert_eq!(
            records(".bar.com", &ing),
            vec![rr("second", RecordType::A, &["127.0.0.1"])]
        );
    }

    #[test]
    fn test_dual_stack_yields_a_and_aaaa() {
        let ing = ingress(&["app.foo.com"], &["127.0.0.1"], &["::1"], &[]);
        assert_eq!(
            records(".foo.com", &ing),
            vec![
                rr("app", RecordType::A, &["127.0.0.1"]),
                rr("app", RecordType::Aaaa, &["::1"]),
            ]
        );
    }

    #[test]
    fn test_hostname_takes_priority_over_ip() {
        let ing = ingress(&["app.foo.com"], &["127.0.0.1"], &[], &["hostname.com"]);
        assert_eq!(
            records(".foo.com", &ing),
            vec![rr("app", RecordType::Cname, &["hostname.com"])]
        );
    }

    #[test]
    fn test_localhost_becomes_loopback_a_record() {
        let ing = ingress(&["app.foo.com"], &[], &[], &["localhost"]);
        assert_eq!(
            records(".foo.com", &ing),
            vec![rr("app", RecordType::A, &["127.0.0.1"])]
        );
    }

    #[test]
    fn test_no_status_yields_no_records() {
        let ing = ingress(&["app.foo.com"], &[], &[], &[]);
        assert!(records(".foo.com", &ing).is_empty());
        assert!(!has_load_balancer_address(&ing));
    }

    #[test]
    fn test_duplicate_hosts_yield_one_record() {
        let ing = ingress(&["app.foo.com", "app.foo.com"], &["10.0.0.1"], &[], &[]);
        assert_eq!(records(".foo.com", &ing).len(), 1);
    }

    #[test]
    fn test_hash_is_order_independent() {
        let hosts = ["a.foo.com", "b.foo.com", "c.foo.com"];
        let ips = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];
        let (_, expected) = to_record_requests_and_hash(".foo.com", &ingress(&hosts, &ips, &[], &[]));

        let host_orders = [[0, 1, 2], [2, 1, 0], [1, 2, 0]];
        let ip_orders = [[0, 1, 2], [1, 0, 2], [2, 0, 1]];
        for ho in &host_orders {
            for io in &ip_orders {
                let h: Vec<&str> = ho.iter().map(|i| hosts[*i]).collect();
                let a: Vec<&str> = io.iter().map(|i| ips[*i]).collect();
                let (_, hash) = to_record_requests_and_hash(".foo.com", &ingress(&h, &a, &[], &[]));
                assert_eq!(hash, expected, "hosts {h:?} ips {a:?}");
            }
        }
    }

    #[test]
    fn test_hash_changes_with_addresses() {
        let (_, first) =
            to_record_requests_and_hash(".foo.com", &ingress(&["app.foo.com"], &["10.0.0.1"], &[], &[]));
        let (_, second) =
            to_record_requests_and_hash(".foo.com", &ingress(&["app.foo.com"], &["10.0.0.2"], &[], &[]));
        assert_ne!(first, second);
    }
}
