//! Response values committed through the write-once guard.
//!
//! # Responsibilities
//! - Hold the status, content type and body a handler wrote
//! - Convert the committed reply into an axum response
//! - Echo the request ID back to the client
//!
//! # Design Decisions
//! - Bodies are fully buffered (`Bytes`); no streaming
//! - Serialization happens before the guard is taken, so the lock is never
//!   held across user code

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Serialize;

use crate::error::{Error, Result};

pub const X_REQUEST_ID: &str = "x-request-id";

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// A buffered response body with its status.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl Reply {
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload).map_err(Error::Encode)?;
        Ok(Self {
            status,
            content_type: Some(JSON),
            body: Bytes::from(body),
        })
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(TEXT),
            body: Bytes::from(body.into()),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// `{"error": message}` with the given status.
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self {
            status,
            content_type: Some(JSON),
            body: Bytes::from(body),
        }
    }

    pub fn into_response(self, request_id: &str) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        if let Some(content_type) = self.content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(X_REQUEST_ID, value);
        }
        response
    }
}

/// Write-once slot guarded by the context's mutex.
#[derive(Debug, Default)]
pub(crate) struct ResponseSlot {
    written: bool,
    reply: Option<Reply>,
}

impl ResponseSlot {
    /// Commit `reply` unless something was already written.
    pub(crate) fn commit(&mut self, reply: Reply) -> Result<()> {
        if self.written {
            return Err(Error::AlreadyResponded);
        }
        self.written = true;
        self.reply = Some(reply);
        Ok(())
    }

    pub(crate) fn is_written(&self) -> bool {
        self.written
    }

    pub(crate) fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }
}
