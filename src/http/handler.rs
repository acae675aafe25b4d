//! Handler abstraction and chain types.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::http::context::Context;

pub type HandlerFuture = BoxFuture<'static, Result<()>>;

/// A unit of request processing.
///
/// A handler may call [`Context::next`] to run the rest of its chain and
/// regain control afterwards; if it does not, the chain stops with it.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> HandlerFuture {
        Box::pin((self)(ctx))
    }
}

/// A chain element, shared between every route that uses it.
pub type SharedHandler = Arc<dyn Handler>;

/// The ordered chain bound to a route.
pub type HandlerChain = Arc<[SharedHandler]>;

/// Box an async function or closure into a chain element.
pub fn from_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(f)
}
