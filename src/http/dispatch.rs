//! Request dispatch: resolve, supervise, respond.
//!
//! # Data Flow
//! ```text
//! axum Request<Body>
//!     → Router::resolve(method, path)      → 404 {"error": "not found"}
//!     → buffer body before the deadline    → 413 past the limit, 500 "time out"
//!     → Context (chain, params, form, deadline, request ID)
//!     → supervisor::execute                 → exactly one Reply
//!     → axum Response (+ x-request-id)
//! ```
//!
//! The deadline starts when dispatch starts, so a client that stalls the
//! body spends the handler's budget.

use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use tokio::time::timeout_at;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::error::Error;
use crate::http::context::{Context, DEFAULT_TIMEOUT};
use crate::http::response::Reply;
use crate::observability::metrics;
use crate::resilience::supervisor::{self, TIME_OUT};
use crate::routing::Router;

const NOT_FOUND: &str = "not found";
const TOO_LARGE: &str = "payload too large";

/// Per-request limits applied by [`dispatch`].
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            timeout: config.dispatch.timeout(),
            max_body_bytes: config.listener.max_body_bytes,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// How a dispatched request ended, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    NotFound,
    Failed,
    Panicked,
    TimedOut,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::NotFound => "not_found",
            Outcome::Failed => "failed",
            Outcome::Panicked => "panicked",
            Outcome::TimedOut => "timed_out",
        }
    }
}

/// Why a request never reached its chain.
enum Rejection {
    NotFound,
    BodyUnreadable(axum::Error),
    BodyTimedOut,
}

/// Run one request through the router under supervision.
pub async fn dispatch(router: &Router, request: Request<Body>, settings: &DispatchSettings) -> Response {
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + settings.timeout;
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let builder = Context::builder()
        .parts(parts)
        .timeout(settings.timeout)
        .deadline(deadline);

    let (ctx, route, rejection) = match router.resolve(&method, &path) {
        Err(_) => (builder.build(), None, Some(Rejection::NotFound)),
        Ok(matched) => {
            let pattern = matched.pattern.clone();
            let builder = builder.route(matched);
            match timeout_at(deadline, to_bytes(body, settings.max_body_bytes)).await {
                Ok(Ok(bytes)) => (builder.body(bytes).load_form().await.build(), Some(pattern), None),
                Ok(Err(e)) => (builder.build(), Some(pattern), Some(Rejection::BodyUnreadable(e))),
                Err(_) => (builder.build(), Some(pattern), Some(Rejection::BodyTimedOut)),
            }
        }
    };

    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id(),
        method = %method,
        path = %path,
        route = route.as_deref().unwrap_or("-"),
    );

    let outcome = async {
        match rejection {
            Some(Rejection::NotFound) => {
                tracing::debug!("No route matched");
                let _ = ctx.write(Reply::error(StatusCode::NOT_FOUND, NOT_FOUND));
                Outcome::NotFound
            }
            Some(Rejection::BodyUnreadable(e)) => {
                tracing::warn!(error = %e, "Request body rejected");
                let _ = ctx.write(Reply::error(StatusCode::PAYLOAD_TOO_LARGE, TOO_LARGE));
                Outcome::Failed
            }
            Some(Rejection::BodyTimedOut) => {
                ctx.set_timed_out();
                let _ = ctx.write(Reply::error(StatusCode::INTERNAL_SERVER_ERROR, TIME_OUT));
                tracing::warn!(
                    timeout_ms = settings.timeout.as_millis() as u64,
                    "Request body not received before the deadline"
                );
                metrics::record_timeout();
                Outcome::TimedOut
            }
            None => match supervisor::execute(&ctx).await {
                Ok(()) if ctx.committed().is_some_and(|r| r.status.is_server_error()) => Outcome::Failed,
                Ok(()) => Outcome::Completed,
                Err(Error::Timeout(_)) => Outcome::TimedOut,
                Err(Error::HandlerFault(_)) => Outcome::Panicked,
                Err(_) => Outcome::Failed,
            },
        }
    }
    .instrument(span.clone())
    .await;

    let reply = ctx
        .committed()
        .unwrap_or_else(|| Reply::empty(StatusCode::OK));

    span.in_scope(|| {
        tracing::info!(
            status = reply.status.as_u16(),
            outcome = outcome.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request finished"
        );
    });
    metrics::record_request(
        method.as_str(),
        route.as_deref().unwrap_or("none"),
        reply.status.as_u16(),
        outcome.as_str(),
        started,
    );

    reply.into_response(ctx.request_id())
}
