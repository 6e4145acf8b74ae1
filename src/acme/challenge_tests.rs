// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `challenge.rs`

#[cfg(test)]
mod tests {
    use crate::acme::challenge::*;
    use crate::acme::AcmeError;
    use crate::dns::client::DirectoryApi;
    use crate::dns::types::{RecordRequest, RecordType, RenewRequest, RenewResponse};
    use crate::dns_errors::DirectoryError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingDirectory {
        created: Mutex<Vec<RecordRequest>>,
        deleted: Mutex<Vec<String>>,
        reject_deletes: bool,
    }

    #[async_trait]
    impl DirectoryApi for RecordingDirectory {
        async fn reserve_domain(&self, _: &str) -> Result<(String, String), DirectoryError> {
            unreachable!("not used by the DNS-01 bridge")
        }

        async fn create_records(
            &self,
            _: &str,
            _: &str,
            _: &str,
            records: &[RecordRequest],
        ) -> Result<(), DirectoryError> {
            self.created.lock().extend_from_slice(records);
            Ok(())
        }

        async fn renew(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &RenewRequest,
        ) -> Result<RenewResponse, DirectoryError> {
            unreachable!("not used by the DNS-01 bridge")
        }

        async fn delete_record(
            &self,
            _: &str,
            _: &str,
            _: &str,
            prefix: &str,
        ) -> Result<(), DirectoryError> {
            if self.reject_deletes {
                return Err(DirectoryError::DomainAuth);
            }
            self.deleted.lock().push(prefix.to_string());
            Ok(())
        }

        async fn purge_records(&self, _: &str, _: &str, _: &str) -> Result<(), DirectoryError> {
            unreachable!("not used by the DNS-01 bridge")
        }
    }

    fn challenge(identifier: &str) -> ChallengeRequest {
        ChallengeRequest {
            identifier: identifier.to_string(),
            token: "tok-123".to_string(),
            key_authorization: "tok-123.thumbprint".to_string(),
            dns_value: "dns-digest".to_string(),
        }
    }

    fn bridge(directory: Arc<RecordingDirectory>) -> Dns01Bridge {
        Dns01Bridge::new(directory, "https://dns.test/v1", ".abc.oss-acorn.io", "t")
    }

    #[test]
    fn test_record_name_for_wildcard_apex() {
        let bridge = bridge(Arc::default());
        assert_eq!(bridge.record_name("abc.oss-acorn.io").unwrap(), "_acme-challenge");
        assert_eq!(bridge.record_name("*.abc.oss-acorn.io").unwrap(), "_acme-challenge");
    }

    #[test]
    fn test_record_name_for_subdomain() {
        let bridge = bridge(Arc::default());
        assert_eq!(
            bridge.record_name("app.abc.oss-acorn.io").unwrap(),
            "_acme-challenge.app"
        );
    }

    #[test]
    fn test_record_name_outside_domain() {
        let err = bridge(Arc::default()).record_name("example.com").unwrap_err();
        assert!(matches!(err, AcmeError::ChallengeValidation { .. }));
    }

    #[tokio::test]
    async fn test_dns01_present_and_clean_up() {
        let directory = Arc::new(RecordingDirectory::default());
        let bridge = bridge(Arc::clone(&directory));
        let request = challenge("abc.oss-acorn.io");

        bridge.present(&request).await.unwrap();
        bridge.clean_up(&request).await.unwrap();

        let created = directory.created.lock().clone();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "_acme-challenge");
        assert_eq!(created[0].record_type, RecordType::Txt);
        assert_eq!(created[0].values, vec!["dns-digest".to_string()]);
        assert_eq!(*directory.deleted.lock(), vec!["_acme-challenge".to_string()]);
        assert!(!bridge.domain_rejected());
    }

    /// Clean-up errors are only logged by the authority, so the bridge remembers them
    #[tokio::test]
    async fn test_dns01_clean_up_domain_auth_is_remembered() {
        let directory = Arc::new(RecordingDirectory {
            reject_deletes: true,
            ..Default::default()
        });
        let solver = bridge(directory.clone());
        let c = challenge("abc.oss-acorn.io");

        solver.present(&c).await.unwrap();
        assert!(!solver.domain_rejected());

        let err = solver.clean_up(&c).await.unwrap_err();
        assert!(err.is_domain_auth());
        assert!(solver.domain_rejected());
    }

    #[tokio::test]
    async fn test_http01_responder_serves_presented_tokens() {
        let responder = Http01Responder::start().await.unwrap();
        let solver = responder.solver();
        let request = challenge("app.example.com");
        let url = format!(
            "http://127.0.0.1:{}/.well-known/acme-challenge/tok-123",
            responder.port()
        );

        let missing = reqwest::get(&url).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        solver.present(&request).await.unwrap();
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "tok-123.thumbprint");

        solver.clean_up(&request).await.unwrap();
        let gone = reqwest::get(&url).await.unwrap();
        assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);

        responder.shutdown().await;
    }

    #[test]
    fn test_challenge_kind_names() {
        assert_eq!(ChallengeKind::Dns01.as_str(), "dns-01");
        assert_eq!(ChallengeKind::Http01.as_str(), "http-01");
    }
}
