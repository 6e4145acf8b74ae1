// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ACME challenge solvers.
//!
//! [`Dns01Bridge`] publishes the DNS-01 TXT record through the managed DNS directory.
//! [`Http01Responder`] runs a small axum server that answers
//! `GET /.well-known/acme-challenge/{token}` with the key authorization.

use super::AcmeError;
use crate::constants::ACME_CHALLENGE_LABEL;
use crate::dns::client::DirectoryApi;
use crate::dns::types::{RecordRequest, RecordType};
use crate::dns_errors::DirectoryError;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// ACME challenge type a solver answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeKind {
    Dns01,
    Http01,
}

impl ChallengeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dns01 => "dns-01",
            Self::Http01 => "http-01",
        }
    }
}

/// One challenge handed to a solver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeRequest {
    /// Identifier under validation, without any `*.` prefix
    pub identifier: String,
    /// HTTP-01 token
    pub token: String,
    /// `token.thumbprint`
    pub key_authorization: String,
    /// DNS-01 TXT record value
    pub dns_value: String,
}

/// Presents and removes challenge responses.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    fn kind(&self) -> ChallengeKind;

    /// Make the response visible to the CA.
    async fn present(&self, challenge: &ChallengeRequest) -> Result<(), AcmeError>;

    /// Remove the response. Called for every presented challenge, whatever the outcome.
    async fn clean_up(&self, challenge: &ChallengeRequest) -> Result<(), AcmeError>;
}

/// DNS-01 solver backed by the managed DNS directory.
///
/// Remembers whether the directory rejected the domain token on any call, including
/// clean-up calls whose errors the authority only logs.
pub struct Dns01Bridge {
    directory: Arc<dyn DirectoryApi>,
    endpoint: String,
    domain: String,
    token: String,
    domain_rejected: AtomicBool,
}

impl Dns01Bridge {
    /// Solver for identifiers under `domain` (leading-dot form), authenticated with `token`.
    #[must_use]
    pub fn new(
        directory: Arc<dyn DirectoryApi>,
        endpoint: impl Into<String>,
        domain: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            endpoint: endpoint.into(),
            domain: domain.into(),
            token: token.into(),
            domain_rejected: AtomicBool::new(false),
        }
    }

    /// True once the directory has answered any call with a domain-auth error.
    #[must_use]
    pub fn domain_rejected(&self) -> bool {
        self.domain_rejected.load(Ordering::SeqCst)
    }

    fn note(&self, err: DirectoryError) -> AcmeError {
        if err.is_domain_auth() {
            self.domain_rejected.store(true, Ordering::SeqCst);
        }
        err.into()
    }

    /// Record name of the TXT record for `identifier`, relative to the managed domain.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::ChallengeValidation`] if the identifier is outside the domain.
    pub fn record_name(&self, identifier: &str) -> Result<String, AcmeError> {
        let identifier = identifier.trim_start_matches("*.").trim_end_matches('.');
        let fqdn = format!("{ACME_CHALLENGE_LABEL}.{identifier}");
        let suffix = if self.domain.starts_with('.') {
            self.domain.clone()
        } else {
            format!(".{}", self.domain)
        };
        fqdn.strip_suffix(suffix.as_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AcmeError::ChallengeValidation {
                domain: identifier.to_string(),
                reason: format!("not under managed domain {}", self.domain),
            })
    }
}

#[async_trait]
impl ChallengeSolver for Dns01Bridge {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Dns01
    }

    async fn present(&self, challenge: &ChallengeRequest) -> Result<(), AcmeError> {
        let name = self.record_name(&challenge.identifier)?;
        debug!(domain = %self.domain, record = %name, "Presenting DNS-01 challenge");
        let record = RecordRequest {
            name,
            record_type: RecordType::Txt,
            values: vec![challenge.dns_value.clone()],
        };
        self.directory
            .create_records(&self.endpoint, &self.domain, &self.token, &[record])
            .await
            .map_err(|e| self.note(e))?;
        Ok(())
    }

    async fn clean_up(&self, challenge: &ChallengeRequest) -> Result<(), AcmeError> {
        let name = self.record_name(&challenge.identifier)?;
        debug!(domain = %self.domain, record = %name, "Removing DNS-01 challenge");
        self.directory
            .delete_record(&self.endpoint, &self.domain, &self.token, &name)
            .await
            .map_err(|e| self.note(e))?;
        Ok(())
    }
}

/// Key authorizations served by the HTTP-01 responder, keyed by token.
#[derive(Clone, Debug, Default)]
pub struct Http01Tokens {
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl Http01Tokens {
    #[must_use]
    pub fn get(&self, token: &str) -> Option<String> {
        self.tokens.read().get(token).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

#[async_trait]
impl ChallengeSolver for Http01Tokens {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Http01
    }

    async fn present(&self, challenge: &ChallengeRequest) -> Result<(), AcmeError> {
        self.tokens.write().insert(
            challenge.token.clone(),
            challenge.key_authorization.clone(),
        );
        Ok(())
    }

    async fn clean_up(&self, challenge: &ChallengeRequest) -> Result<(), AcmeError> {
        self.tokens.write().remove(&challenge.token);
        Ok(())
    }
}

/// Router answering HTTP-01 requests out of `tokens`.
pub fn challenge_router(tokens: Http01Tokens) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/{token}", get(serve_challenge))
        .with_state(tokens)
}

async fn serve_challenge(State(tokens): State<Http01Tokens>, Path(token): Path<String>) -> Response {
    match tokens.get(&token) {
        Some(key_authorization) => {
            debug!(%token, "Served HTTP-01 challenge");
            key_authorization.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// HTTP-01 responder bound to a free local port.
pub struct Http01Responder {
    tokens: Http01Tokens,
    port: u16,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Http01Responder {
    /// Bind a free port on all interfaces and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`AcmeError::ChallengeServer`] if no port can be bound.
    pub async fn start() -> Result<Self, AcmeError> {
        let listener = TcpListener::bind(("0.0.0.0", 0))
            .await
            .map_err(AcmeError::ChallengeServer)?;
        let port = listener
            .local_addr()
            .map_err(AcmeError::ChallengeServer)?
            .port();

        let tokens = Http01Tokens::default();
        let shutdown = CancellationToken::new();
        let app = challenge_router(tokens.clone());
        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
            {
                warn!(error = %e, "HTTP-01 challenge server stopped with error");
            }
        });

        info!(port, "HTTP-01 challenge server listening");
        Ok(Self {
            tokens,
            port,
            shutdown,
            handle,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Solver that publishes tokens to this responder.
    #[must_use]
    pub fn solver(&self) -> Arc<dyn ChallengeSolver> {
        Arc::new(self.tokens.clone())
    }

    /// Stop serving and wait for the server task to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "HTTP-01 challenge server task failed");
        }
        debug!(port = self.port, "HTTP-01 challenge server stopped");
    }
}

#[cfg(test)]
#[path = "challenge_tests.rs"]
mod challenge_tests;
