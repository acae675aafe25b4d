//! Error types shared by routing, dispatch and the request helpers.

use std::time::Duration;

use axum::http::Method;
use thiserror::Error;

/// Boxed error accepted from application handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while registering routes or handling a request.
#[derive(Debug, Error)]
pub enum Error {
    /// A route with the same trie shape is already registered for the method.
    #[error("route already registered: {method} {path}")]
    DuplicateRoute { method: Method, path: String },

    /// The route pattern cannot be inserted into the trie.
    #[error("invalid route pattern {path:?}: {reason}")]
    InvalidRoute { path: String, reason: &'static str },

    /// No route matches the request method and path.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: Method, path: String },

    /// A response was already committed for this request.
    #[error("response already written")]
    AlreadyResponded,

    /// The handler chain panicked; carries the panic message.
    #[error("handler panicked: {0}")]
    HandlerFault(String),

    /// The request deadline elapsed before the chain finished.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to decode request body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to encode response body: {0}")]
    Encode(serde_json::Error),

    #[error("multipart error: {0}")]
    Multipart(#[from] multer::Error),

    #[error("missing form field: {0}")]
    MissingField(String),

    /// Application error returned by a handler.
    #[error(transparent)]
    Handler(BoxError),
}

impl Error {
    /// Wrap an arbitrary application error.
    pub fn handler<E: Into<BoxError>>(err: E) -> Self {
        Error::Handler(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
