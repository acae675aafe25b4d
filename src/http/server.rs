//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum app with a single catch-all handler
//! - Wire up middleware (tracing, body limit)
//! - Bind server to listener with peer addresses available
//! - Hand every request to the dispatcher
//! - Stop accepting on shutdown and drain in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::dispatch::{dispatch, DispatchSettings};
use crate::routing::Router;

/// Application state injected into the catch-all handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub settings: Arc<DispatchSettings>,
}

/// HTTP server serving a frozen [`Router`].
pub struct HttpServer {
    app: axum::Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Freeze `router` and build the app around it.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        let settings = DispatchSettings::from_config(&config);
        let state = AppState {
            router: Arc::new(router),
            settings: Arc::new(settings),
        };
        let app = Self::build_app(&config, state);
        Self { app, config }
    }

    fn build_app(config: &ServerConfig, state: AppState) -> axum::Router {
        axum::Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes)),
            )
    }

    /// The configured app, for serving it elsewhere or driving it in tests.
    pub fn into_router(self) -> axum::Router {
        self.app
    }

    /// Run the server until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            timeout_ms = self.config.dispatch.timeout_ms,
            "HTTP server starting"
        );

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    dispatch(&state.router, request, &state.settings).await
}
