// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP client for the managed DNS directory service.
//!
//! | Operation      | Request                                          | Auth   |
//! |----------------|--------------------------------------------------|--------|
//! | reserve domain | `POST {endpoint}/domains`                        | none   |
//! | create record  | `POST {endpoint}/domains/{domain}/records`       | bearer |
//! | renew          | `POST {endpoint}/domains/{domain}/renew`         | bearer |
//! | delete record  | `DELETE {endpoint}/domains/{domain}/records/{p}` | bearer |
//! | purge          | `POST {endpoint}/domains/{domain}/purgerecords`  | bearer |
//!
//! Every call consults the shared [`RateLimiter`] first and fails fast while its request
//! class is throttled. HTTP 401 responses carrying `data.noDomain = true` map to
//! [`DirectoryError::DomainAuth`].

use super::rate_limit::{RateLimiter, RequestClass};
use super::types::{AuthErrorResponse, DomainResponse, RecordRequest, RenewRequest, RenewResponse};
use crate::dns_errors::DirectoryError;
use crate::metrics;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Capability set of the DNS directory.
///
/// Implemented by [`DirectoryClient`] for the real service; tests substitute fakes.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Reserve a new domain. Returns `(domain, token)` with the domain carrying a leading dot.
    async fn reserve_domain(&self, endpoint: &str) -> Result<(String, String), DirectoryError>;

    /// Create records one request at a time, stopping at the first failure.
    async fn create_records(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
        records: &[RecordRequest],
    ) -> Result<(), DirectoryError>;

    /// Renew the domain and report records the directory considers out of sync.
    async fn renew(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
        request: &RenewRequest,
    ) -> Result<RenewResponse, DirectoryError>;

    /// Delete the record(s) under `prefix`.
    async fn delete_record(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
        prefix: &str,
    ) -> Result<(), DirectoryError>;

    /// Delete every record of the domain without releasing the domain.
    async fn purge_records(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
    ) -> Result<(), DirectoryError>;
}

/// reqwest-backed [`DirectoryApi`].
#[derive(Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl DirectoryClient {
    /// Build a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build DNS directory HTTP client")?;
        Ok(Self::with_http_client(http, RateLimiter::new()))
    }

    /// Build a client from an existing HTTP client and limiter.
    #[must_use]
    pub fn with_http_client(http: reqwest::Client, limiter: RateLimiter) -> Self {
        Self { http, limiter }
    }

    /// Shared rate-limit state.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn send<B>(
        &self,
        operation: &'static str,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>, DirectoryError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let class = if token.is_empty() {
            RequestClass::Unauthenticated
        } else {
            RequestClass::Authenticated
        };
        self.limiter.check(class)?;

        let start = Instant::now();
        let result = self.execute(class, method, url, token, body).await;
        metrics::record_directory_request(
            operation,
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        result
    }

    async fn execute<B>(
        &self,
        class: RequestClass,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>, DirectoryError>
    where
        B: Serialize + ?Sized + Sync,
    {
        debug!(%method, url, "Sending DNS directory request");

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json");
        if !token.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| DirectoryError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        debug!(%method, url, status = status.as_u16(), "DNS directory response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(self.limiter.record_rate_limited(class, response.headers()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DirectoryError::Transport {
                url: url.to_string(),
                reason: format!("failed to read response body: {e}"),
            })?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(match serde_json::from_slice::<AuthErrorResponse>(&bytes) {
                Ok(auth) if auth.data.no_domain => DirectoryError::DomainAuth,
                Ok(auth) => DirectoryError::AuthFailed { message: auth.msg },
                Err(e) => DirectoryError::AuthFailed {
                    message: format!("unreadable error body: {e}"),
                },
            });
        }

        if !status.is_success() {
            return Err(DirectoryError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(bytes.to_vec())
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, DirectoryError> {
    serde_json::from_slice(body).map_err(|e| DirectoryError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn endpoint_base(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}

#[async_trait]
impl DirectoryApi for DirectoryClient {
    async fn reserve_domain(&self, endpoint: &str) -> Result<(String, String), DirectoryError> {
        let url = format!("{}/domains", endpoint_base(endpoint));
        let body = self
            .send::<()>("reserve_domain", Method::POST, &url, "", None)
            .await?;
        let response: DomainResponse = decode(&url, &body)?;

        let domain = if response.name.starts_with('.') {
            response.name
        } else {
            format!(".{}", response.name)
        };
        Ok((domain, response.token))
    }

    async fn create_records(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
        records: &[RecordRequest],
    ) -> Result<(), DirectoryError> {
        let url = format!("{}/domains/{domain}/records", endpoint_base(endpoint));
        for record in records {
            self.send("create_record", Method::POST, &url, token, Some(record))
                .await?;
        }
        Ok(())
    }

    async fn renew(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
        request: &RenewRequest,
    ) -> Result<RenewResponse, DirectoryError> {
        let url = format!("{}/domains/{domain}/renew", endpoint_base(endpoint));
        let body = self
            .send("renew", Method::POST, &url, token, Some(request))
            .await?;
        decode(&url, &body)
    }

    async fn delete_record(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
        prefix: &str,
    ) -> Result<(), DirectoryError> {
        let url = format!(
            "{}/domains/{domain}/records/{prefix}",
            endpoint_base(endpoint)
        );
        self.send::<()>("delete_record", Method::DELETE, &url, token, None)
            .await?;
        Ok(())
    }

    async fn purge_records(
        &self,
        endpoint: &str,
        domain: &str,
        token: &str,
    ) -> Result<(), DirectoryError> {
        let url = format!("{}/domains/{domain}/purgerecords", endpoint_base(endpoint));
        self.send::<()>("purge_records", Method::POST, &url, token, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
