//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + body limit layers)
//!     → dispatch.rs (buffer body, resolve route, build Context)
//!     → resilience::supervisor (run chain under deadline)
//!         → handler.rs chain, driven by context.rs `next()`
//!         → request.rs helpers (query/form/params/cookies)
//!     → response.rs (committed Reply → Response, x-request-id)
//!     → Send to client
//! ```

pub mod context;
pub mod dispatch;
pub mod handler;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use context::{Context, ContextBuilder, ExecutionState};
pub use dispatch::{dispatch, DispatchSettings};
pub use handler::{from_fn, Handler, HandlerChain, SharedHandler};
pub use request::FileHeader;
pub use response::{Reply, X_REQUEST_ID};
pub use server::HttpServer;
