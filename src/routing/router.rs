//! Route table: one segment trie per supported method.
//!
//! # Responsibilities
//! - Register routes under GET, POST, PUT and DELETE
//! - Prepend global middlewares at registration time
//! - Resolve method + path to a handler chain, or an explicit not-found
//!
//! # Design Decisions
//! - Immutable once shared (`Arc<Router>`); no locking on the read path
//! - Middlewares added after a route is registered do not apply to it
//! - Registration errors are returned to the caller, never swallowed

use std::collections::HashMap;

use axum::http::Method;

use crate::error::{Error, Result};
use crate::http::handler::SharedHandler;
use crate::routing::group::Group;
use crate::routing::trie::{RouteMatch, Tree};

/// Methods with a trie of their own.
pub const SUPPORTED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// Method-indexed route table with a global middleware list.
pub struct Router {
    trees: HashMap<Method, Tree>,
    middlewares: Vec<SharedHandler>,
}

impl Router {
    pub fn new() -> Self {
        let trees = SUPPORTED_METHODS
            .iter()
            .map(|m| (m.clone(), Tree::new(m.clone())))
            .collect();
        Self {
            trees,
            middlewares: Vec::new(),
        }
    }

    /// Append middlewares for routes registered from now on.
    pub fn use_middleware<I>(&mut self, handlers: I)
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.middlewares.extend(handlers);
    }

    pub fn get<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::GET, path, handlers.into_iter().collect())
    }

    pub fn post<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::POST, path, handlers.into_iter().collect())
    }

    pub fn put<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::PUT, path, handlers.into_iter().collect())
    }

    pub fn delete<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::DELETE, path, handlers.into_iter().collect())
    }

    /// Open a registration scope under `prefix`.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group::new(self, prefix)
    }

    pub(crate) fn add(&mut self, method: Method, path: &str, handlers: Vec<SharedHandler>) -> Result<()> {
        let tree = self.trees.get_mut(&method).ok_or_else(|| Error::InvalidRoute {
            path: path.to_string(),
            reason: "unsupported method",
        })?;

        let chain: Vec<SharedHandler> = self
            .middlewares
            .iter()
            .cloned()
            .chain(handlers)
            .collect();
        let chain_len = chain.len();

        tree.add_route(path, chain)?;

        tracing::debug!(
            method = %method,
            path = %path,
            handlers = chain_len,
            "Route registered"
        );
        Ok(())
    }

    /// Look up the chain and params for a request.
    ///
    /// Lower-case method names are normalized; unsupported methods are
    /// reported as not found.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch> {
        let tree = match self.trees.get(method) {
            Some(tree) => Some(tree),
            None => Method::from_bytes(method.as_str().to_ascii_uppercase().as_bytes())
                .ok()
                .and_then(|m| self.trees.get(&m)),
        };

        tree.and_then(|t| t.match_path(path))
            .ok_or_else(|| Error::RouteNotFound {
                method: method.clone(),
                path: path.to_string(),
            })
    }

    /// Every registered `(method, pattern)` pair, grouped by method.
    pub fn routes(&self) -> Vec<(Method, String)> {
        SUPPORTED_METHODS
            .iter()
            .filter_map(|m| self.trees.get(m))
            .flat_map(|tree| {
                tree.patterns()
                    .into_iter()
                    .map(move |p| (tree.method().clone(), p.to_string()))
            })
            .collect()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::from_fn;
    use crate::http::Context;
    use std::sync::{Arc, Mutex};

    fn noop() -> SharedHandler {
        from_fn(|_ctx: Context| async { Ok::<(), Error>(()) })
    }

    fn marker(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> SharedHandler {
        let log = Arc::clone(log);
        from_fn(move |ctx: Context| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                ctx.next().await
            }
        })
    }

    async fn run(router: &Router, method: Method, path: &str) -> Context {
        let route = router.resolve(&method, path).unwrap();
        let ctx = Context::builder().method(method).uri(path.parse().unwrap()).route(route).build();
        ctx.next().await.unwrap();
        ctx
    }

    #[test]
    fn test_resolve_per_method() {
        let mut router = Router::new();
        router.get("/subject/:id", [noop()]).unwrap();
        router.delete("/subject/:id", [noop(), noop()]).unwrap();

        let get = router.resolve(&Method::GET, "/subject/3").unwrap();
        assert_eq!(get.handlers.len(), 1);
        let delete = router.resolve(&Method::DELETE, "/subject/3").unwrap();
        assert_eq!(delete.handlers.len(), 2);

        assert!(matches!(
            router.resolve(&Method::POST, "/subject/3"),
            Err(Error::RouteNotFound { .. })
        ));
    }

    #[test]
    fn test_unsupported_method_not_found() {
        let mut router = Router::new();
        router.get("/a", [noop()]).unwrap();

        assert!(matches!(
            router.resolve(&Method::PATCH, "/a"),
            Err(Error::RouteNotFound { .. })
        ));
        let lower = Method::from_bytes(b"get").unwrap();
        assert!(router.resolve(&lower, "/a").is_ok());
    }

    #[test]
    fn test_duplicate_route_is_an_error() {
        let mut router = Router::new();
        router.put("/user/:id", [noop()]).unwrap();
        let err = router.put("/user/:uid", [noop()]).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { ref method, .. } if *method == Method::PUT));
        // same pattern under another method is fine
        router.post("/user/:uid", [noop()]).unwrap();
    }

    #[test]
    fn test_middleware_applies_only_to_later_routes() {
        let mut router = Router::new();
        router.get("/before", [noop()]).unwrap();
        router.use_middleware([noop(), noop()]);
        router.get("/after", [noop()]).unwrap();

        assert_eq!(router.resolve(&Method::GET, "/before").unwrap().handlers.len(), 1);
        assert_eq!(router.resolve(&Method::GET, "/after").unwrap().handlers.len(), 3);
    }

    #[tokio::test]
    async fn test_chain_order_global_then_route() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router.use_middleware([marker(&log, "global")]);
        router
            .get("/x", [marker(&log, "route-mw"), marker(&log, "handler")])
            .unwrap();

        run(&router, Method::GET, "/x").await;
        assert_eq!(*log.lock().unwrap(), vec!["global", "route-mw", "handler"]);
    }

    #[test]
    fn test_routes_listing() {
        let mut router = Router::new();
        router.post("/b", [noop()]).unwrap();
        router.get("/a", [noop()]).unwrap();

        assert_eq!(
            router.routes(),
            vec![(Method::GET, "/a".to_string()), (Method::POST, "/b".to_string())]
        );
    }
}
