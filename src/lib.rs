//! Switchyard: a segment-trie HTTP router with supervised middleware chains.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::schema::ServerConfig;
pub use error::{Error, Result};
pub use http::{from_fn, Context, Handler, HttpServer, SharedHandler};
pub use lifecycle::Shutdown;
pub use routing::{Group, Params, Router};
