//! Switchyard demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ axum server ──▶ dispatch ──▶ Router (trie per method)
//!                                        │
//!                                        ▼
//!                                   supervisor ──▶ handler chain
//!                                   (deadline,       (global mw → group mw
//!                                    panic guard)     → route mw → handler)
//!                                        │
//!     Client Response                    ▼
//!     ◀────────────── exactly one committed reply (+ x-request-id)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;

use switchyard::config::{load_config, ServerConfig};
use switchyard::http::middleware::{cost, recovery};
use switchyard::observability::{logging, metrics};
use switchyard::{from_fn, Context, Error, HttpServer, Router, Shutdown};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Trie router with supervised middleware dispatch", long_about = None)]
struct Args {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!("switchyard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        timeout_ms = config.dispatch.timeout_ms,
        max_body_bytes = config.listener.max_body_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let router = build_router()?;
    for (method, pattern) in router.routes() {
        tracing::debug!(method = %method, pattern = %pattern, "Route");
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    HttpServer::new(config, router)
        .run(listener, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Demo route table. Any registration error aborts startup.
fn build_router() -> switchyard::Result<Router> {
    let mut router = Router::new();
    router.use_middleware([cost()]);

    router.get("/user/login", [from_fn(user_login)])?;
    router.post("/user/login", [from_fn(user_login_form)])?;

    {
        let mut subject = router.group("/subject");
        subject.delete("/:id", [from_fn(subject_delete)])?;
        subject.put("/:id", [from_fn(subject_update)])?;
        subject.get("/:id", [from_fn(subject_get)])?;
        subject.get("/list/all", [from_fn(subject_list)])?;

        let mut info = subject.group("/info");
        info.get("/name", [from_fn(subject_name)])?;
    }

    router.get("/foo", [from_fn(foo)])?;
    router.get("/slow", [from_fn(slow)])?;
    router.get("/panic", [from_fn(panicking)])?;
    router.get("/recovered", [recovery(), from_fn(panicking)])?;

    Ok(router)
}

async fn user_login(ctx: Context) -> switchyard::Result<()> {
    let (name, _) = ctx.query_string("name", "guest".to_string());
    ctx.json(StatusCode::OK, &serde_json::json!({ "user": name, "action": "login" }))
}

#[derive(Deserialize)]
struct Login {
    user: String,
}

async fn user_login_form(ctx: Context) -> switchyard::Result<()> {
    let user = match ctx.form_string("user", String::new()) {
        (user, true) => user,
        (_, false) => ctx.bind_json::<Login>()?.user,
    };
    ctx.json(StatusCode::OK, &serde_json::json!({ "user": user, "action": "login" }))
}

async fn subject_delete(ctx: Context) -> switchyard::Result<()> {
    let (id, _) = ctx.param_int64("id", 0);
    ctx.json(StatusCode::OK, &serde_json::json!({ "deleted": id }))
}

async fn subject_update(ctx: Context) -> switchyard::Result<()> {
    let (id, _) = ctx.param_int64("id", 0);
    ctx.json(StatusCode::OK, &serde_json::json!({ "updated": id }))
}

async fn subject_get(ctx: Context) -> switchyard::Result<()> {
    match ctx.param_int64("id", 0) {
        (id, true) => ctx.json(StatusCode::OK, &serde_json::json!({ "id": id })),
        (_, false) => ctx.json(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({ "error": "id must be an integer" }),
        ),
    }
}

async fn subject_list(ctx: Context) -> switchyard::Result<()> {
    ctx.json(StatusCode::OK, &serde_json::json!(["math", "physics", "history"]))
}

async fn subject_name(ctx: Context) -> switchyard::Result<()> {
    ctx.text(StatusCode::OK, "subject info")
}

async fn foo(ctx: Context) -> switchyard::Result<()> {
    ctx.json(StatusCode::OK, "ok")
}

/// Cooperates with cancellation: stops as soon as the deadline passes.
async fn slow(ctx: Context) -> switchyard::Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(10)) => ctx.text(StatusCode::OK, "finished"),
        _ = ctx.cancelled() => {
            tracing::debug!(request_id = %ctx.request_id(), "Slow handler cancelled");
            Ok(())
        }
    }
}

async fn panicking(_ctx: Context) -> Result<(), Error> {
    panic!("panic test")
}
