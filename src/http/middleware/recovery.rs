//! In-chain panic recovery.
//!
//! The supervisor already contains panics per request; this middleware lets
//! a route turn a downstream panic into a normal 500 reply and keep its own
//! "after" code running.

use std::panic::AssertUnwindSafe;

use axum::http::StatusCode;
use futures_util::FutureExt;

use crate::http::context::Context;
use crate::http::handler::{from_fn, SharedHandler};
use crate::resilience::supervisor::panic_message;

pub fn recovery() -> SharedHandler {
    from_fn(|ctx: Context| async move {
        match AssertUnwindSafe(ctx.next()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload);
                tracing::error!(request_id = %ctx.request_id(), panic = %message, "Recovered from handler panic");
                if ctx.json(StatusCode::INTERNAL_SERVER_ERROR, &message).is_err() {
                    tracing::debug!(request_id = %ctx.request_id(), "Response written before panic");
                }
                Ok(())
            }
        }
    })
}
