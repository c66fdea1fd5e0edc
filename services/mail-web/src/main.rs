//! Graph Mail Web
//!
//! Single-binary web app that:
//! 1. Keeps a Microsoft identity token in a local file, refreshing it silently
//! 2. Falls back to device code sign-in (or browser sign-in via /login)
//! 3. Shows the signed-in user's profile and inbox, and sends mail, via Graph

mod config;
mod error;
mod login;
mod mailbox;
mod metrics;
mod render;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use graph_auth::{AzureIdentity, CredentialCache, Endpoints, TokenStore};
use graph_mail::GraphClient;

use crate::config::Config;
use crate::login::{LoginSettings, PendingLogins};
use crate::metrics::ServiceStats;

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    cache: Arc<CredentialCache>,
    graph: Arc<GraphClient>,
    logins: PendingLogins,
    login: Arc<LoginSettings>,
    stats: ServiceStats,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Request tracking runs as a route layer so it sees the matched route
/// template; the concurrency limit wraps everything.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(mailbox::index))
        .route("/list-inbox", get(mailbox::list_inbox))
        .route("/send-mail", post(mailbox::send_mail))
        .route("/login", get(login::login))
        .route("/getAToken", get(login::callback))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting graph-mail-web");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        tenant_id = %config.azure.tenant_id,
        scopes = %config.azure.graph_user_scopes,
        token_cache = %config.azure.token_cache_path.display(),
        confidential_client = config.azure.client_secret.is_some(),
        "configuration loaded"
    );

    let http = reqwest::Client::new();
    let endpoints = Endpoints::for_tenant(&config.azure.authority_host, &config.azure.tenant_id);
    let login_settings = LoginSettings {
        authorize_endpoint: endpoints.authorize.clone(),
        client_id: config.azure.client_id.clone(),
        redirect_uri: config.azure.redirect_uri.clone(),
    };

    let identity = AzureIdentity::new(http.clone(), config.azure.client_id.clone(), endpoints)
        .with_client_secret(config.azure.client_secret.take())
        .with_device_code_timeout(Duration::from_secs(config.azure.device_code_timeout_secs));

    let cache = Arc::new(CredentialCache::new(
        Arc::new(identity),
        TokenStore::new(&config.azure.token_cache_path),
        config.azure.scopes(),
    ));

    match cache.status().await {
        Ok(status) => info!(
            has_token = status.has_token,
            valid = status.valid,
            has_refresh_token = status.has_refresh_token,
            "token cache inspected"
        ),
        Err(e) => warn!(error = %e, "token cache unreadable, requests will fail until it is fixed"),
    }

    let graph = Arc::new(GraphClient::new(
        http,
        config.azure.graph_base_url.clone(),
        cache.clone(),
    ));

    let app_state = AppState {
        cache,
        graph,
        logins: PendingLogins::new(),
        login: Arc::new(login_settings),
        stats: ServiceStats::new(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race the drain against
    // the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Tag each request with an id, then count and time it by route template.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("request", %request_id, method = %request.method(), %route);

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let status = response.status();

    state.stats.requests_total.fetch_add(1, Ordering::Relaxed);
    if status.is_server_error() {
        state.stats.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    metrics::record_request(&route, status.as_u16(), started.elapsed().as_secs_f64());
    span.in_scope(|| debug!(status = status.as_u16(), "request completed"));

    response
}

/// Health endpoint: uptime, request counters and the persisted token's state.
/// Returns 503 when the token file cannot be read.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.stats.started_at.elapsed().as_secs();
    let requests = state.stats.requests_total.load(Ordering::Relaxed);
    let errors = state.stats.errors_total.load(Ordering::Relaxed);

    let (status_code, body) = match state.cache.status().await {
        Ok(token) => (
            axum::http::StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "token": token,
                "uptime_seconds": uptime,
                "requests_served": requests,
                "errors_total": errors,
            }),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "degraded",
                "token_error": e.to_string(),
                "uptime_seconds": uptime,
                "requests_served": requests,
                "errors_total": errors,
            }),
        ),
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
