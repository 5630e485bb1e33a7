//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and stop on shutdown signal

use axum::{body::Body, http::Request, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::request::{request_id, MakeRequestUuidV4, X_REQUEST_ID};
use crate::sync::{ConfigHandle, SyncStats};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Read-only view of the live configuration.
    pub config: ConfigHandle,
    pub stats: Arc<SyncStats>,
    /// Boolean key gating `GET /users`.
    pub gate_key: Arc<str>,
    pub poll_interval_secs: u64,
}

/// HTTP server for the gated endpoints.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server reading configuration through `config`.
    pub fn new(settings: &ServiceConfig, config: ConfigHandle, stats: Arc<SyncStats>) -> Self {
        let state = AppState {
            config,
            stats,
            gate_key: Arc::from(settings.features.users_gate_key.as_str()),
            poll_interval_secs: settings.agent.poll_interval_secs,
        };

        let router = Self::build_router(settings, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(settings: &ServiceConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(handlers::home))
            .route("/health", get(handlers::health))
            .route("/config", get(handlers::get_config))
            .route("/users", get(handlers::list_users))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                settings.listener.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id(request),
                    )
                }),
            )
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
    }

    /// The router, for serving or for driving directly in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until a shutdown signal arrives.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
