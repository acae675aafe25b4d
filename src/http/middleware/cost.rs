//! Request timing middleware.

use std::time::Instant;

use crate::http::context::Context;
use crate::http::handler::{from_fn, SharedHandler};

/// Log how long the rest of the chain took.
///
/// The chain's result is passed through untouched.
pub fn cost() -> SharedHandler {
    from_fn(|ctx: Context| async move {
        let started = Instant::now();
        let result = ctx.next().await;
        let elapsed = started.elapsed();

        tracing::info!(
            request_id = %ctx.request_id(),
            uri = %ctx.uri(),
            cost_secs = elapsed.as_secs_f64(),
            ok = result.is_ok(),
            "Request cost"
        );
        result
    })
}
