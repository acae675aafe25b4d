//! Supervised execution of a request's handler chain.
//!
//! # Responsibilities
//! - Run the chain on its own task so a panic stays inside it
//! - Race the chain against the request deadline
//! - Commit exactly one response whatever the outcome
//!
//! # Outcomes
//! ```text
//! chain returns Ok        → 200 with empty body, unless a handler wrote
//! chain returns Err       → 500 {"error": "inner error"}, unless a handler wrote
//! chain panics            → 500 {"error": <panic message>}   (Panicked)
//! deadline elapses first  → 500 {"error": "time out"}        (TimedOut)
//! deadline after a write   → the handler's reply               (Completed)
//! ```
//!
//! # Design Decisions
//! - A timed-out chain is not aborted; it is detached and its later writes
//!   fail with `AlreadyResponded`
//! - Panics are observed through `JoinError::is_panic`, never re-raised
//! - Faults and timeouts are always logged here; ordinary handler errors
//!   only at debug level

use std::any::Any;

use axum::http::StatusCode;
use tokio::time::sleep_until;

use crate::error::{Error, Result};
use crate::http::context::{Context, ExecutionState};
use crate::http::response::Reply;
use crate::observability::metrics;

pub const INNER_ERROR: &str = "inner error";
pub const TIME_OUT: &str = "time out";

/// Execute the chain bound to `ctx` under its deadline.
///
/// Returns `Err(HandlerFault)` or `Err(Timeout)` when the chain was cut short;
/// in both cases the 500 reply has already been committed.
pub async fn execute(ctx: &Context) -> Result<()> {
    if !ctx.start() {
        return Err(Error::AlreadyResponded);
    }

    let chain = ctx.clone();
    let mut task = tokio::spawn(async move { chain.next().await });

    tokio::select! {
        joined = &mut task => match joined {
            Ok(Ok(())) => {
                ctx.finish(ExecutionState::Completed);
                commit_fallback(ctx, Reply::empty(StatusCode::OK));
                Ok(())
            }
            Ok(Err(err)) => {
                ctx.finish(ExecutionState::Completed);
                if matches!(err, Error::AlreadyResponded) {
                    tracing::warn!(request_id = %ctx.request_id(), "Handler wrote a response twice");
                } else {
                    tracing::debug!(request_id = %ctx.request_id(), error = %err, "Handler chain returned an error");
                }
                commit_fallback(ctx, Reply::error(StatusCode::INTERNAL_SERVER_ERROR, INNER_ERROR));
                Ok(())
            }
            Err(join_err) if join_err.is_panic() => {
                ctx.finish(ExecutionState::Panicked);
                let message = panic_message(join_err.into_panic());
                tracing::error!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    panic = %message,
                    "Handler panicked"
                );
                metrics::record_fault();
                ctx.cancel();
                commit_fallback(ctx, Reply::error(StatusCode::INTERNAL_SERVER_ERROR, &message));
                Err(Error::HandlerFault(message))
            }
            Err(join_err) => {
                // only reachable if the runtime is shutting down
                ctx.finish(ExecutionState::Panicked);
                tracing::error!(request_id = %ctx.request_id(), error = %join_err, "Handler task cancelled");
                commit_fallback(ctx, Reply::error(StatusCode::INTERNAL_SERVER_ERROR, INNER_ERROR));
                Err(Error::HandlerFault(join_err.to_string()))
            }
        },
        _ = sleep_until(ctx.deadline()) => {
            // the chain keeps running detached
            drop(task);

            if ctx.write(Reply::error(StatusCode::INTERNAL_SERVER_ERROR, TIME_OUT)).is_err() {
                // the handler committed before the deadline fired; its reply stands
                ctx.cancel();
                ctx.finish(ExecutionState::Completed);
                tracing::debug!(request_id = %ctx.request_id(), "Deadline passed after the response was written");
                return Ok(());
            }

            ctx.set_timed_out();
            ctx.cancel();
            ctx.finish(ExecutionState::TimedOut);
            tracing::warn!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                timeout_ms = ctx.timeout().as_millis() as u64,
                "Request timed out"
            );
            metrics::record_timeout();
            Err(Error::Timeout(ctx.timeout()))
        }
    }
}

/// Commit `reply` unless a handler already wrote one.
fn commit_fallback(ctx: &Context, reply: Reply) {
    if ctx.write(reply).is_err() {
        tracing::trace!(request_id = %ctx.request_id(), "Response already committed by handler");
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::{from_fn, SharedHandler};
    use std::time::Duration;

    fn context(handlers: Vec<SharedHandler>, timeout_ms: u64) -> Context {
        Context::builder()
            .handlers(handlers)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
    }

    fn body_json(ctx: &Context) -> serde_json::Value {
        serde_json::from_slice(&ctx.committed().unwrap().body).unwrap()
    }

    #[tokio::test]
    async fn test_silent_chain_gets_empty_ok() {
        let ctx = context(vec![from_fn(|_ctx: Context| async { Ok::<(), Error>(()) })], 500);
        execute(&ctx).await.unwrap();

        let reply = ctx.committed().unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.is_empty());
        assert_eq!(ctx.state(), ExecutionState::Completed);
    }

    #[tokio::test]
    async fn test_handler_reply_kept() {
        let ctx = context(
            vec![from_fn(|ctx: Context| async move { ctx.text(StatusCode::ACCEPTED, "done") })],
            500,
        );
        execute(&ctx).await.unwrap();
        assert_eq!(ctx.committed().unwrap().status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_chain_error_becomes_inner_error() {
        let ctx = context(
            vec![from_fn(|_ctx: Context| async { Err(Error::handler("db down")) })],
            500,
        );
        execute(&ctx).await.unwrap();

        assert_eq!(ctx.committed().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&ctx)["error"], INNER_ERROR);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let ctx = context(
            vec![from_fn(|_ctx: Context| async move {
                if true {
                    panic!("kaboom");
                }
                Ok::<(), Error>(())
            })],
            500,
        );
        let err = execute(&ctx).await.unwrap_err();

        assert!(matches!(err, Error::HandlerFault(ref m) if m == "kaboom"));
        assert_eq!(ctx.state(), ExecutionState::Panicked);
        assert_eq!(ctx.committed().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&ctx)["error"], "kaboom");
    }

    #[tokio::test]
    async fn test_timeout_writes_once() {
        let ctx = context(
            vec![from_fn(|ctx: Context| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ctx.text(StatusCode::OK, "too late")
            })],
            30,
        );
        let err = execute(&ctx).await.unwrap_err();

        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(30)));
        assert!(ctx.has_timed_out());
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.state(), ExecutionState::TimedOut);
        assert_eq!(body_json(&ctx)["error"], TIME_OUT);

        // the detached chain finishes and its write is rejected
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(body_json(&ctx)["error"], TIME_OUT);
    }

    #[tokio::test]
    async fn test_reply_written_before_deadline_stands() {
        let ctx = context(
            vec![from_fn(|ctx: Context| async move {
                ctx.text(StatusCode::OK, "early")?;
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<(), Error>(())
            })],
            30,
        );
        execute(&ctx).await.unwrap();

        assert!(!ctx.has_timed_out());
        assert_eq!(ctx.state(), ExecutionState::Completed);
        let reply = ctx.committed().unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, "early");
    }

    #[tokio::test]
    async fn test_cooperative_handler_observes_cancel() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let ctx = context(
            vec![from_fn(move |ctx: Context| {
                let tx = tx.lock().unwrap().take();
                async move {
                    ctx.cancelled().await;
                    if let Some(tx) = tx {
                        let _ = tx.send(ctx.has_timed_out());
                    }
                    Ok::<(), Error>(())
                }
            })],
            20,
        );
        assert!(execute(&ctx).await.is_err());
        let saw_timeout = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert!(saw_timeout);
    }

    #[tokio::test]
    async fn test_panic_does_not_affect_concurrent_request() {
        let panicking = context(
            vec![from_fn(|_ctx: Context| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if true {
                    panic!("boom");
                }
                Ok::<(), Error>(())
            })],
            500,
        );
        let healthy = context(
            vec![from_fn(|ctx: Context| async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                ctx.text(StatusCode::OK, "fine")
            })],
            500,
        );

        let (a, b) = tokio::join!(execute(&panicking), execute(&healthy));
        assert!(a.is_err());
        b.unwrap();
        assert_eq!(healthy.committed().unwrap().body, "fine");
    }

    #[tokio::test]
    async fn test_execute_runs_once() {
        let ctx = context(vec![], 100);
        execute(&ctx).await.unwrap();
        assert!(matches!(execute(&ctx).await, Err(Error::AlreadyResponded)));
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic");
    }
}
