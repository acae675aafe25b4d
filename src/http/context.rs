//! Per-request context and the chain-advance protocol.
//!
//! # Responsibilities
//! - Carry the request head, body, route params and handler chain
//! - Advance through the chain one handler per `next()` call
//! - Guard the response so exactly one write is committed
//! - Expose the deadline, cancellation signal and timed-out flag
//!
//! # Design Decisions
//! - One fresh context per request, shared by cheap `Arc` clones between the
//!   supervisor and the task running the chain
//! - The response mutex is the only lock and it is per request
//! - Cancellation is advisory; handlers may ignore it

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Result;
use crate::http::handler::{HandlerChain, SharedHandler};
use crate::http::request::{self, ValueMap};
use crate::http::response::{Reply, ResponseSlot, X_REQUEST_ID};
use crate::routing::{Params, RouteMatch};

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a request's chain execution.
///
/// `Pending → Running → Completed | Panicked | TimedOut`; the terminal
/// transition happens once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionState {
    Pending = 0,
    Running = 1,
    Completed = 2,
    Panicked = 3,
    TimedOut = 4,
}

impl ExecutionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ExecutionState::Running,
            2 => ExecutionState::Completed,
            3 => ExecutionState::Panicked,
            4 => ExecutionState::TimedOut,
            _ => ExecutionState::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Panicked | ExecutionState::TimedOut
        )
    }
}

struct Inner {
    request_id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    /// Form fields of an urlencoded or multipart body.
    form: ValueMap,
    remote_addr: Option<SocketAddr>,

    handlers: HandlerChain,
    params: Params,
    pattern: Option<String>,
    /// Number of handlers started so far; 0 means "before the first".
    cursor: AtomicUsize,

    response: Mutex<ResponseSlot>,

    timeout: Duration,
    deadline: Instant,
    timed_out: AtomicBool,
    state: AtomicU8,
    cancel: watch::Sender<bool>,
}

/// Request state shared by every handler in a chain.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Run the next handler in the chain and wait for it.
    ///
    /// Returns `Ok(())` once past the end of the chain. An error from any
    /// downstream handler is returned unchanged.
    pub async fn next(&self) -> Result<()> {
        let index = self.inner.cursor.fetch_add(1, Ordering::SeqCst);
        let handler: Option<SharedHandler> = self.inner.handlers.get(index).cloned();
        match handler {
            Some(handler) => handler.call(self.clone()).await,
            None => Ok(()),
        }
    }

    /// Index of the most recently started handler, if any.
    pub fn cursor(&self) -> Option<usize> {
        let started = self.inner.cursor.load(Ordering::SeqCst);
        started
            .checked_sub(1)
            .filter(|index| *index < self.inner.handlers.len())
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    // ---- route ----

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// Pattern of the matched route, e.g. `/subject/:id`.
    pub fn pattern(&self) -> Option<&str> {
        self.inner.pattern.as_deref()
    }

    // ---- request ----

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    pub(crate) fn form_fields(&self) -> &ValueMap {
        &self.inner.form
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    // ---- response ----

    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, payload: &T) -> Result<()> {
        let reply = Reply::json(status, payload)?;
        self.write(reply)
    }

    pub fn text(&self, status: StatusCode, body: impl Into<String>) -> Result<()> {
        self.write(Reply::text(status, body))
    }

    /// Respond with `status` and an empty body.
    pub fn status(&self, status: StatusCode) -> Result<()> {
        self.write(Reply::empty(status))
    }

    /// Commit `reply`, or fail with `AlreadyResponded`.
    pub fn write(&self, reply: Reply) -> Result<()> {
        self.slot().commit(reply)
    }

    pub fn is_responded(&self) -> bool {
        self.slot().is_written()
    }

    /// The reply committed so far.
    pub fn committed(&self) -> Option<Reply> {
        self.slot().reply().cloned()
    }

    fn slot(&self) -> MutexGuard<'_, ResponseSlot> {
        // nothing panics while the slot is held, but never let poisoning
        // turn into a second failure
        self.inner
            .response
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---- deadline ----

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    pub fn set_timed_out(&self) {
        self.inner.timed_out.store(true, Ordering::SeqCst);
    }

    pub fn has_timed_out(&self) -> bool {
        self.inner.timed_out.load(Ordering::SeqCst)
    }

    /// Resolves once the request has been cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancel.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel.borrow()
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancel.send_replace(true);
    }

    // ---- execution state ----

    pub fn state(&self) -> ExecutionState {
        ExecutionState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// `Pending → Running`. False if the chain was already started.
    pub(crate) fn start(&self) -> bool {
        self.transition(ExecutionState::Pending, ExecutionState::Running)
    }

    /// `Running → terminal`. False if a terminal state was already reached.
    pub(crate) fn finish(&self, to: ExecutionState) -> bool {
        debug_assert!(to.is_terminal());
        self.transition(ExecutionState::Running, to)
    }

    fn transition(&self, from: ExecutionState, to: ExecutionState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.inner.request_id)
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .field("pattern", &self.inner.pattern)
            .field("handlers", &self.inner.handlers.len())
            .field("state", &self.state())
            .finish()
    }
}

/// Assembles a [`Context`] from a request and its resolved route.
pub struct ContextBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    form: Option<ValueMap>,
    remote_addr: Option<SocketAddr>,
    request_id: Option<String>,
    handlers: Vec<SharedHandler>,
    params: Params,
    pattern: Option<String>,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            form: None,
            remote_addr: None,
            request_id: None,
            handlers: Vec::new(),
            params: Params::new(),
            pattern: None,
            timeout: DEFAULT_TIMEOUT,
            deadline: None,
        }
    }
}

impl ContextBuilder {
    /// Take method, URI, headers and peer address from request parts.
    pub fn parts(mut self, parts: Parts) -> Self {
        self.remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        self.method = parts.method;
        self.uri = parts.uri;
        self.headers = parts.headers;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse multipart text fields from the body set so far.
    ///
    /// Urlencoded bodies need no loading; they are parsed in `build`. A
    /// malformed multipart body leaves the form empty; `form_file` reports
    /// the error to the handler that asks for it.
    pub async fn load_form(mut self) -> Self {
        if request::is_multipart(&self.headers) {
            match request::multipart_fields(&self.headers, &self.body).await {
                Ok(form) => self.form = Some(form),
                Err(e) => tracing::debug!(error = %e, "Multipart form not parsed"),
            }
        }
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Bind the resolved chain, params and pattern.
    pub fn route(mut self, route: RouteMatch) -> Self {
        self.handlers = route.handlers.to_vec();
        self.params = route.params;
        self.pattern = Some(route.pattern);
        self
    }

    pub fn handlers<I>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.handlers = handlers.into_iter().collect();
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fix the deadline instead of starting it at `build`.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build the context; unless set explicitly, the deadline starts now.
    pub fn build(self) -> Context {
        let request_id = self
            .request_id
            .or_else(|| {
                self.headers
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let (cancel, _) = watch::channel(false);
        let form = self
            .form
            .unwrap_or_else(|| request::urlencoded_fields(&self.headers, &self.body));
        let deadline = self.deadline.unwrap_or_else(|| Instant::now() + self.timeout);

        Context {
            inner: Arc::new(Inner {
                request_id,
                method: self.method,
                uri: self.uri,
                headers: self.headers,
                body: self.body,
                form,
                remote_addr: self.remote_addr,
                handlers: HandlerChain::from(self.handlers),
                params: self.params,
                pattern: self.pattern,
                cursor: AtomicUsize::new(0),
                response: Mutex::new(ResponseSlot::default()),
                timeout: self.timeout,
                deadline,
                timed_out: AtomicBool::new(false),
                state: AtomicU8::new(ExecutionState::Pending as u8),
                cancel,
            }),
        }
    }
}
