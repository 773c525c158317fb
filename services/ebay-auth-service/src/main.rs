//! eBay OAuth credential manager
//!
//! Single binary that:
//! 1. Walks an operator through eBay consent (`auth-url`, `exchange`)
//! 2. Keeps user and application tokens fresh in a durable token file
//! 3. Prints valid bearer tokens for scripts (`token user|client`)
//! 4. Serves health, metrics and OAuth resource metadata (`serve`)
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

mod cli;
mod config;
mod metadata;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use ebay_auth::{
    HttpTokenEndpoint, SystemClock, TokenStore, build_authorization_url, generate_state,
};
use ebay_credentials::{
    AuthorizationInjector, CredentialProvider, CredentialStatus, FlowState, GrantFlow,
    ProviderOptions, spawn_refresh_task,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::metadata::{
    PROTECTED_RESOURCE_PATH, ProtectedResourceMetadata, SERVER_INFO_PATH, ServerInfo,
};

/// How long in-flight requests may drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    provider: CredentialProvider,
    metadata: Arc<ProtectedResourceMetadata>,
    server_info: Arc<ServerInfo>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(PROTECTED_RESOURCE_PATH, get(protected_resource_handler))
        .route(SERVER_INFO_PATH, get(server_info_handler))
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
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let Cli { config, command } = Cli::parse();
    let command = command.unwrap_or(Command::Serve);

    let config_path = Config::resolve_path(config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    if config.ebay.environment.is_none() {
        warn!("EBAY_ENVIRONMENT not set, defaulting to sandbox");
    }

    info!(
        environment = %config.environment(),
        token_file = %config.token_path().display(),
        "configuration loaded"
    );

    run(command, config).await
}

/// Execute one subcommand.
async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::InitTemplate { force } => {
            let store = TokenStore::new(config.token_path());
            store
                .write_template(force)
                .await
                .context("failed to write token template")?;
            println!("wrote token template to {}", store.path().display());
        }
        Command::AuthUrl { state } => {
            let redirect_uri = config.ebay.redirect_uri.as_deref().context(
                "redirect_uri is required (set EBAY_REDIRECT_URI or [ebay] redirect_uri)",
            )?;
            anyhow::ensure!(
                !config.ebay.client_id.trim().is_empty(),
                "client_id is required (set EBAY_CLIENT_ID or [ebay] client_id)"
            );
            let state = state.unwrap_or_else(generate_state);
            let url = build_authorization_url(
                &config.ebay.client_id,
                redirect_uri,
                config.environment(),
                &config.ebay.scopes,
                Some(&state),
            )?;
            let body = serde_json::json!({ "authorization_url": url, "state": state });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Exchange { code } => {
            let provider = build_provider(&config)?;
            provider
                .exchange_authorization_code(&code)
                .await
                .context("authorization code exchange failed")?;
            println!(
                "user tokens saved to {}",
                provider.store().path().display()
            );
        }
        Command::SetTokens {
            access,
            refresh,
            access_expiry,
            refresh_expiry,
        } => {
            let provider = build_provider(&config)?;
            provider
                .set_user_tokens(access, refresh, access_expiry, refresh_expiry)
                .await
                .context("failed to install user tokens")?;
            println!(
                "user tokens saved to {}",
                provider.store().path().display()
            );
        }
        Command::Token { flow } => {
            let flow = GrantFlow::from(flow);
            let injector = AuthorizationInjector::new(Arc::new(build_provider(&config)?));
            let token = injector
                .authorize(flow)
                .await
                .with_context(|| format!("no valid {flow} token"))?;
            println!("{}", token.expose());
        }
        Command::Refresh => {
            let provider = build_provider(&config)?;
            provider
                .force_refresh_user_token()
                .await
                .context("user token refresh failed")?;
            print_status(&provider.status())?;
        }
        Command::Status => {
            let provider = build_provider(&config)?;
            provider.initialize().await;
            print_status(&provider.status())?;
        }
        Command::Revoke => {
            let provider = build_provider(&config)?;
            provider.revoke().await.context("failed to revoke tokens")?;
            println!("all tokens revoked");
        }
        Command::Serve => serve(config).await?,
    }
    Ok(())
}

fn build_provider(config: &Config) -> Result<CredentialProvider> {
    let client = config.client_config()?;
    let endpoint = HttpTokenEndpoint::new(client).context("failed to build token endpoint")?;
    let store = TokenStore::new(config.token_path());
    Ok(CredentialProvider::new(
        Arc::new(endpoint),
        Arc::new(store),
        ProviderOptions {
            environment: config.environment(),
            refresh_timeout: config.refresh_timeout(),
            clock: Arc::new(SystemClock),
        },
    ))
}

fn print_status(status: &CredentialStatus) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(status)?);
    Ok(())
}

/// Run the HTTP service until SIGINT/SIGTERM.
async fn serve(config: Config) -> Result<()> {
    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let provider = build_provider(&config)?;
    provider.initialize().await;
    let status = provider.status();
    info!(
        user = status.user.state.label(),
        client = status.client.state.label(),
        "credentials loaded"
    );

    let environment = config.environment();
    let metadata = ProtectedResourceMetadata::from_config(&config.metadata, environment);
    if let Some(url) = metadata.metadata_url() {
        info!(url = %url, "protected resource metadata");
    }
    let app_state = AppState {
        provider: provider.clone(),
        server_info: Arc::new(ServerInfo::from_config(&config.metadata, environment)),
        metadata: Arc::new(metadata),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let refresh_task = spawn_refresh_task(
        provider,
        Duration::from_secs(config.server.refresh_interval_secs),
        Duration::from_secs(config.server.refresh_threshold_secs),
    );

    let app = build_router(app_state, config.server.max_connections);
    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // Graceful shutdown with drain timeout:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain, starting at signal receipt
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    refresh_task.abort();

    // Signal the server to begin draining
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

/// Health endpoint: credential state per flow plus uptime.
///
/// 200 "healthy" while user tokens are usable or renewable. When the user
/// grant needs reauthorization the service is 200 "degraded" as long as the
/// client-credentials grant still works, and 503 "unhealthy" once that is
/// rejected too.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.provider.status();
    let uptime = state.started_at.elapsed().as_secs();

    let (status_code, label) = if status.user.state != FlowState::ReauthRequired {
        (StatusCode::OK, "healthy")
    } else if !status.client_grant_rejected {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let body = serde_json::json!({
        "status": label,
        "environment": status.environment,
        "user": status.user.state,
        "client": status.client.state,
        "refresh_token_dead": status.refresh_token_dead,
        "missing_scopes": status.missing_scopes,
        "uptime_seconds": uptime,
    });

    (
        status_code,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint. Samples credential gauges before rendering.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    metrics::record_status(&state.provider.status());
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

async fn protected_resource_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.metadata.as_ref().clone())
}

async fn server_info_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.server_info.as_ref().clone())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ebay_auth::{ClientConfig, Environment};
    use ebay_credentials::CredentialError;
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Create a PrometheusHandle for tests without installing a global recorder.
    /// Using build_recorder() avoids the "recorder already installed" panic when
    /// multiple tests run in the same process.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    /// Provider backed by a real HTTP endpoint pointed at `token_url`.
    fn test_provider(dir: &tempfile::TempDir, token_url: &str) -> CredentialProvider {
        let client = ClientConfig::new("test-app", "test-secret", Environment::Sandbox)
            .with_token_url(token_url)
            .with_request_timeout(Duration::from_secs(5));
        let endpoint = HttpTokenEndpoint::new(client).unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        CredentialProvider::new(
            Arc::new(endpoint),
            Arc::new(store),
            ProviderOptions {
                environment: Environment::Sandbox,
                ..ProviderOptions::default()
            },
        )
    }

    fn test_app_state(provider: CredentialProvider) -> AppState {
        let config = config::MetadataConfig::default();
        AppState {
            provider,
            metadata: Arc::new(ProtectedResourceMetadata::from_config(
                &config,
                Environment::Sandbox,
            )),
            server_info: Arc::new(ServerInfo::from_config(&config, Environment::Sandbox)),
            prometheus: test_prometheus_handle(),
            started_at: Instant::now(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_healthy_with_user_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let provider = test_provider(&dir, "http://127.0.0.1:1/token");
        provider
            .set_user_tokens("v^1.1#user-access-abc", "v^1.1#user-refresh-def", None, None)
            .await
            .unwrap();

        let app = build_router(test_app_state(provider), 1000);
        let (status, json) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["user"], "valid");
        assert_eq!(json["environment"], "sandbox");
        assert!(
            !json.to_string().contains("v^1.1#"),
            "health must never expose token values"
        );
    }

    #[tokio::test]
    async fn health_is_degraded_without_user_grant() {
        let dir = tempfile::tempdir().unwrap();
        let provider = test_provider(&dir, "http://127.0.0.1:1/token");
        provider.initialize().await;

        let app = build_router(test_app_state(provider), 1000);
        let (status, json) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["user"], "reauth_required");
    }

    #[tokio::test]
    async fn health_is_unavailable_when_client_grant_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "client authentication failed",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let provider = test_provider(&dir, &format!("{}/token", server.uri()));
        let err = provider.get_valid_client_access_token().await.unwrap_err();
        assert!(matches!(err, CredentialError::InvalidGrant { .. }), "got: {err:?}");

        let app = build_router(test_app_state(provider), 1000);
        let (status, json) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unhealthy");
    }

    #[tokio::test]
    async fn protected_resource_metadata_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let provider = test_provider(&dir, "http://127.0.0.1:1/token");

        let app = build_router(test_app_state(provider), 1000);
        let (status, json) = get_json(app, "/.well-known/oauth-protected-resource").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["resource"], "http://localhost:3000");
        assert_eq!(
            json["authorization_servers"][0],
            "https://auth.sandbox.ebay.com"
        );
        assert!(json["scopes_supported"].as_array().unwrap().len() > 1);
    }

    #[tokio::test]
    async fn server_info_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let provider = test_provider(&dir, "http://127.0.0.1:1/token");

        let app = build_router(test_app_state(provider), 1000);
        let (status, json) = get_json(app, "/.well-known/mcp-server-info").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "eBay MCP Server");
        assert_eq!(json["authorization_required"], true);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let dir = tempfile::tempdir().unwrap();
        let provider = test_provider(&dir, "http://127.0.0.1:1/token");

        let app = build_router(test_app_state(provider), 1000);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(
            content_type.starts_with("text/plain"),
            "metrics must use Prometheus text format, got: {content_type}"
        );
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let provider = test_provider(&dir, "http://127.0.0.1:1/token");

        let app = build_router(test_app_state(provider), 1000);
        let response = app
            .oneshot(Request::builder().uri("/v1/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
