// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{http::header, http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::Parser;
use clusterdomain::{
    acme::{is_issuance_in_progress, AcmeAuthority, CertificateManager, CertificateManagerSettings},
    constants::{
        CONFIG_MAP_NAME, DEFAULT_CHALLENGE_TIMEOUT_SECS, DEFAULT_DNS_RENEW_INTERVAL_SECS,
        DEFAULT_HTTP01_READY_TIMEOUT_SECS, DEFAULT_HTTP01_SELECTOR, DEFAULT_METRICS_ADDR,
        DEFAULT_NAMESPACE, DEFAULT_REQUEST_TIMEOUT_SECS, DNS_SECRET_NAME,
        ERROR_REQUEUE_DURATION_SECS, HTTP01_READY_POLL_INTERVAL_SECS,
        ISSUANCE_IN_PROGRESS_REQUEUE_SECS, METRICS_SERVER_PATH, RECONCILE_REQUEUE_SECS,
        TOKIO_WORKER_THREADS,
    },
    context::Context,
    daemon::SyncDaemon,
    dns::DirectoryClient,
    dns_errors::is_rate_limited,
    labels::managed_selector,
    metrics,
    reconcilers::{reconcile_dns_config, reconcile_ingress, reconcile_tls_secret},
    store::KubeStore,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Managed DNS domain and ACME certificate controller
#[derive(Debug, Parser)]
#[command(name = "clusterdomain", version, about)]
struct Args {
    /// Namespace holding the feature config map and the controller's secrets
    #[arg(long, env = "POD_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Address of the Prometheus metrics server
    #[arg(long, env = "METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    metrics_addr: std::net::SocketAddr,

    /// Interval between domain renewals
    #[arg(long, env = "DNS_RENEW_INTERVAL_SECS", default_value_t = DEFAULT_DNS_RENEW_INTERVAL_SECS)]
    dns_renew_interval_secs: u64,

    /// Bound on ACME challenge validation
    #[arg(long, env = "CHALLENGE_TIMEOUT_SECS", default_value_t = DEFAULT_CHALLENGE_TIMEOUT_SECS)]
    challenge_timeout_secs: u64,

    /// Bound on waiting for the HTTP-01 ingress to receive an address
    #[arg(long, env = "HTTP01_READY_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP01_READY_TIMEOUT_SECS)]
    http01_ready_timeout_secs: u64,

    /// Timeout of DNS directory requests
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    /// Pod labels (`key=value`, repeatable or comma separated) selecting this controller
    /// for HTTP-01 challenge traffic
    #[arg(
        long = "http01-selector",
        env = "HTTP01_SELECTOR",
        value_parser = parse_label,
        value_delimiter = ',',
        default_value = DEFAULT_HTTP01_SELECTOR
    )]
    http01_selector: Vec<(String, String)>,
}

/// Parse a `key=value` label.
fn parse_label(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), val.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got {value:?}")),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("clusterdomain")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_tracing() {
    // Respects RUST_LOG (default info) and RUST_LOG_FORMAT (json or text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing();
    info!(namespace = %args.namespace, "Starting clusterdomain controller");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let cancel = CancellationToken::new();
    let store = Arc::new(KubeStore::new(client.clone()));
    let directory = Arc::new(DirectoryClient::new(Duration::from_secs(
        args.request_timeout_secs,
    ))?);
    let certificates = Arc::new(CertificateManager::new(
        store.clone(),
        directory.clone(),
        Arc::new(AcmeAuthority::new()),
        CertificateManagerSettings {
            namespace: args.namespace.clone(),
            challenge_timeout: Duration::from_secs(args.challenge_timeout_secs),
            http01_ready_timeout: Duration::from_secs(args.http01_ready_timeout_secs),
            http01_poll_interval: Duration::from_secs(HTTP01_READY_POLL_INTERVAL_SECS),
            http01_selector: args.http01_selector.iter().cloned().collect::<BTreeMap<_, _>>(),
        },
        cancel.clone(),
    ));
    let ctx = Arc::new(Context::new(
        store.clone(),
        directory.clone(),
        certificates,
        args.namespace.clone(),
    ));

    let daemon = SyncDaemon::new(store, directory, args.namespace.clone());
    let daemon_task = {
        let cancel = cancel.clone();
        let interval = Duration::from_secs(args.dns_renew_interval_secs);
        tokio::spawn(async move { daemon.run(interval, cancel).await })
    };

    let metrics_task = {
        let cancel = cancel.clone();
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, cancel).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    };

    info!("Starting all controllers");

    // Controllers should never exit; if one does, log it and stop the process
    let result = tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
        result = run_config_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: ConfigMap controller exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow::anyhow!("ConfigMap controller exited unexpectedly without error")))
        }
        result = run_ingress_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: Ingress controller exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow::anyhow!("Ingress controller exited unexpectedly without error")))
        }
        result = run_tls_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: TLS secret controller exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow::anyhow!("TLS secret controller exited unexpectedly without error")))
        }
    };

    cancel.cancel();
    let _ = daemon_task.await;
    let _ = metrics_task.await;
    info!("clusterdomain controller stopped");
    result
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Serve `/metrics` until `cancel` fires.
async fn run_metrics_server(addr: std::net::SocketAddr, cancel: CancellationToken) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, path = METRICS_SERVER_PATH, "Metrics server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

/// Run the feature `ConfigMap` controller
///
/// Changes to the DNS secret also trigger the config map, so a freshly reserved domain is
/// picked up without waiting for the periodic requeue.
async fn run_config_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting ConfigMap controller");

    let namespace = ctx.namespace.clone();
    let api = Api::<ConfigMap>::namespaced(client.clone(), &namespace);
    let secrets = Api::<Secret>::namespaced(client, &namespace);

    Controller::new(
        api,
        Config::default().fields(&format!("metadata.name={CONFIG_MAP_NAME}")),
    )
    .watches(
        secrets,
        Config::default().fields(&format!("metadata.name={DNS_SECRET_NAME}")),
        move |_secret| Some(ObjectRef::<ConfigMap>::new(CONFIG_MAP_NAME).within(&namespace)),
    )
    .run(reconcile_config_wrapper, error_policy, ctx)
    .for_each(|_| futures::future::ready(()))
    .await;

    Ok(())
}

/// Run the managed `Ingress` controller
async fn run_ingress_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting Ingress controller");
    debug!("Initializing Ingress controller with cluster-wide watch");

    let api = Api::<Ingress>::all(client);

    Controller::new(api, Config::default().labels(&managed_selector()))
        .run(reconcile_ingress_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the managed TLS `Secret` controller
async fn run_tls_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting TLS secret controller");

    let api = Api::<Secret>::all(client);

    Controller::new(api, Config::default().labels(&managed_selector()))
        .run(reconcile_tls_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Map a reconcile result to an action, recording metrics and logging failures.
///
/// Issuance already in progress is not a failure: it is logged at debug level and
/// the object is requeued shortly.
fn finish(
    kind: &str,
    name: &str,
    start: Instant,
    result: Result<()>,
) -> Result<Action, ReconcileError> {
    match result {
        Ok(()) => {
            metrics::record_reconciliation_success(kind, start.elapsed());
            debug!("Successfully reconciled {}: {}", kind, name);
            Ok(Action::requeue(Duration::from_secs(RECONCILE_REQUEUE_SECS)))
        }
        Err(e) if is_issuance_in_progress(&e) => {
            metrics::record_reconciliation_requeue(kind, "issuance_in_progress");
            debug!("Certificate issuance in progress for {} {}, requeueing: {}", kind, name, e);
            Ok(Action::requeue(Duration::from_secs(
                ISSUANCE_IN_PROGRESS_REQUEUE_SECS,
            )))
        }
        Err(e) if is_rate_limited(&e) => {
            metrics::record_reconciliation_error(kind, start.elapsed());
            warn!("Rate limited while reconciling {} {}: {:#}", kind, name, e);
            Err(e.into())
        }
        Err(e) => {
            metrics::record_reconciliation_error(kind, start.elapsed());
            error!("Failed to reconcile {} {}: {:#}", kind, name, e);
            Err(e.into())
        }
    }
}

/// Reconcile wrapper for the feature `ConfigMap`
async fn reconcile_config_wrapper(
    config_map: Arc<ConfigMap>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_dns_config(&ctx, &config_map).await;
    finish("ConfigMap", &config_map.name_any(), start, result)
}

/// Reconcile wrapper for managed `Ingress`es
async fn reconcile_ingress_wrapper(
    ingress: Arc<Ingress>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_ingress(&ctx, &ingress).await;
    let name = format!(
        "{}/{}",
        ingress.namespace().unwrap_or_default(),
        ingress.name_any()
    );
    finish("Ingress", &name, start, result)
}

/// Reconcile wrapper for managed TLS `Secret`s
async fn reconcile_tls_wrapper(
    secret: Arc<Secret>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_tls_secret(&ctx, &secret).await.map(|_| ());
    let name = format!(
        "{}/{}",
        secret.namespace().unwrap_or_default(),
        secret.name_any()
    );
    finish("Secret", &name, start, result)
}

/// Error policy for all controllers
fn error_policy(
    _resource: Arc<impl std::fmt::Debug>,
    _err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
