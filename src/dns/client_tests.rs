// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `client.rs`

#[cfg(test)]
mod tests {
    use crate::dns::client::{DirectoryApi, DirectoryClient};
    use crate::dns::types::{RecordRequest, RecordType, RenewRequest};
    use crate::dns_errors::DirectoryError;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOMAIN: &str = ".abc.oss-acorn.io";
    const TOKEN: &str = "secret-token";

    fn client() -> DirectoryClient {
        DirectoryClient::new(Duration::from_secs(5)).unwrap()
    }

    fn a_record(name: &str) -> RecordRequest {
        RecordRequest {
            name: name.to_string(),
            record_type: RecordType::A,
            values: vec!["10.0.0.1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_reserve_domain_normalizes_leading_dot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/domains"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "name": "abc.oss-acorn.io",
                "token": "new-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (domain, token) = client().reserve_domain(&server.uri()).await.unwrap();

        assert_eq!(domain, DOMAIN);
        assert_eq!(token, "new-token");
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_create_records_sends_one_request_per_record_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/domains/{DOMAIN}/records")))
            .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(2)
            .mount(&server)
            .await;

        client()
            .create_records(&server.uri(), DOMAIN, TOKEN, &[a_record("app"), a_record("api")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_records_serializes_wire_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/domains/{DOMAIN}/records")))
            .and(body_json(serde_json::json!({
                "name": "app",
                "type": "A",
                "values": ["10.0.0.1"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client()
            .create_records(&server.uri(), DOMAIN, TOKEN, &[a_record("app")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_records_stops_at_first_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/domains/{DOMAIN}/records")))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = client()
            .create_records(&server.uri(), DOMAIN, TOKEN, &[a_record("app"), a_record("api")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DirectoryError::UnexpectedStatus { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_401_with_no_domain_is_domain_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/domains/{DOMAIN}/purgerecords")))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status": 401,
                "msg": "domain not found",
                "data": {"noDomain": true}
            })))
            .mount(&server)
            .await;

        let err = client()
            .purge_records(&server.uri(), DOMAIN, TOKEN)
            .await
            .unwrap_err();

        assert!(matches!(err, DirectoryError::DomainAuth));
    }

    #[tokio::test]
    async fn test_401_without_no_domain_is_generic_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/domains/{DOMAIN}/records/_acme-challenge")))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status": 401,
                "msg": "bad token",
                "data": {"noDomain": false}
            })))
            .mount(&server)
            .await;

        let err = client()
            .delete_record(&server.uri(), DOMAIN, TOKEN, "_acme-challenge")
            .await
            .unwrap_err();

        assert!(matches!(err, DirectoryError::AuthFailed { .. }));
    }

    #[tokio::test]
    async fn test_renew_decodes_out_of_sync_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/domains/{DOMAIN}/renew")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "abc.oss-acorn.io",
                "outOfSyncRecords": [{"fqdn": "app.abc.oss-acorn.io", "type": "A"}]
            })))
            .mount(&server)
            .await;

        let response = client()
            .renew(
                &server.uri(),
                DOMAIN,
                TOKEN,
                &RenewRequest {
                    records: vec![a_record("app")],
                    version: "v0.1.0".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(response.out_of_sync_records.len(), 1);
        assert_eq!(response.out_of_sync_records[0].fqdn, "app.abc.oss-acorn.io");
    }

    #[tokio::test]
    async fn test_rate_limited_requests_fail_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/domains/{DOMAIN}/renew")))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Date", "Wed, 01 Jan 2025 12:00:00 GMT")
                    .insert_header("Retry-After", "Wed, 01 Jan 2025 12:01:00 GMT"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let request = RenewRequest::default();

        let first = client
            .renew(&server.uri(), DOMAIN, TOKEN, &request)
            .await
            .unwrap_err();
        assert!(matches!(first, DirectoryError::RateLimited { .. }));

        let second = client
            .renew(&server.uri(), DOMAIN, TOKEN, &request)
            .await
            .unwrap_err();
        assert!(matches!(second, DirectoryError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_authenticated_limit_does_not_block_reservation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/domains/{DOMAIN}/renew")))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Date", "Wed, 01 Jan 2025 12:00:00 GMT")
                    .insert_header("Retry-After", "Wed, 01 Jan 2025 12:01:00 GMT"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/domains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": ".abc.oss-acorn.io",
                "token": "t"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let _ = client
            .renew(&server.uri(), DOMAIN, TOKEN, &RenewRequest::default())
            .await;

        assert!(client.reserve_domain(&server.uri()).await.is_ok());
    }
}
