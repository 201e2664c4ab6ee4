//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router; every path is a page to compose
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener and drain on shutdown

use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::compose::{ComposerOptions, Orchestrator};
use crate::config::GatewayConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};

/// HTTP server for the fragment gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a server composing pages with the configured defaults.
    pub fn new(config: GatewayConfig) -> Self {
        let options = ComposerOptions::from_config(&config);
        Self::with_options(config, options)
    }

    /// Create a server with custom composition hooks (fetchers, tag handler, listeners).
    pub fn with_options(config: GatewayConfig, options: ComposerOptions) -> Self {
        let orchestrator = Orchestrator::new(options);
        let router = Self::build_router(orchestrator);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// There is no timeout layer: the orchestrator enforces the request
    /// budget itself so an expired request still gets a proper 500 head.
    fn build_router(orchestrator: Orchestrator) -> Router {
        Router::new()
            .route("/", any(compose_handler))
            .route("/{*path}", any(compose_handler))
            .with_state(orchestrator)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight responses.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            fragment_tag = %self.config.fragments.tag,
            templates = %self.config.templates.directory,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Compose the page for any method and path.
async fn compose_handler(State(orchestrator): State<Orchestrator>, request: Request) -> Response<Body> {
    orchestrator.handle(request).await
}
