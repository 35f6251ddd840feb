//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the instrumentation session and diagnostic bus for the process
//! - Resolve diagnostic accessors (fail fast on an incompatible payload contract)
//! - Create Axum Router with the demo handlers
//! - Wire up middleware (tracing, timeout)
//! - Serve until the shutdown broadcast fires

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{CorrelatorConfig, ObserverConfig, UpstreamConfig};
use crate::diagnostics::{AccessorError, DiagnosticBus, PayloadShapes};
use crate::http::client::{ClientError, InstrumentedClient};
use crate::http::handlers::{fetch_with_diagnostic_tap, fetch_with_event_listener, hello};
use crate::instrumentation::InstrumentationSession;
use crate::observability::{sink_for, LineSink};
use crate::observers::TapAccessors;

/// Startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("diagnostic tap is incompatible with the client's payloads: {0}")]
    Accessor(#[from] AccessorError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: InstrumentationSession,
    pub bus: DiagnosticBus,
    pub client: InstrumentedClient,
    pub tap_accessors: TapAccessors,
    pub sink: Arc<dyn LineSink>,
    pub upstream: UpstreamConfig,
    pub correlator: CorrelatorConfig,
}

/// HTTP server for the demo endpoints.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: ObserverConfig,
}

impl HttpServer {
    /// Create a server writing observer lines to the configured output.
    pub fn new(config: ObserverConfig) -> Result<Self, ServerError> {
        let sink = sink_for(config.observability.output);
        Self::with_parts(config, sink, PayloadShapes::builtin())
    }

    /// Create a server with an explicit sink and payload shape registry.
    pub fn with_parts(
        config: ObserverConfig,
        sink: Arc<dyn LineSink>,
        shapes: PayloadShapes,
    ) -> Result<Self, ServerError> {
        let tap_accessors = TapAccessors::resolve(&shapes)?;

        let session = InstrumentationSession::new();
        let bus = DiagnosticBus::new();
        let client = InstrumentedClient::new(&session, &bus, &config.upstream)?;

        let state = AppState {
            session,
            bus,
            client,
            tap_accessors,
            sink,
            upstream: config.upstream.clone(),
            correlator: config.correlator.clone(),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ObserverConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(hello))
            .route("/test", get(fetch_with_event_listener))
            .route("/test2", get(fetch_with_diagnostic_tap))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// A clone of the router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, upstream = %self.config.upstream.todo_url, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_hello_route() {
        let server = HttpServer::with_parts(
            ObserverConfig::default(),
            Arc::new(MemorySink::new()),
            PayloadShapes::builtin(),
        )
        .unwrap();

        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Hello World!");
    }

    #[test]
    fn test_startup_fails_without_payload_shapes() {
        let result = HttpServer::with_parts(
            ObserverConfig::default(),
            Arc::new(MemorySink::new()),
            PayloadShapes::new(),
        );
        assert!(matches!(result, Err(ServerError::Accessor(_))));
    }

    #[test]
    fn test_client_source_registered_with_session() {
        let server = HttpServer::with_parts(
            ObserverConfig::default(),
            Arc::new(MemorySink::new()),
            PayloadShapes::builtin(),
        )
        .unwrap();

        let sources = server.state().session.source_names();
        assert!(sources.iter().any(|s| s == "http.client"));
        assert!(sources.iter().any(|s| s == "runtime.tasks"));
    }
}
