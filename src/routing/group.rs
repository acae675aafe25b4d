//! Registration scopes sharing a path prefix and middlewares.

use axum::http::Method;

use crate::error::Result;
use crate::http::handler::SharedHandler;
use crate::routing::router::Router;

/// A prefix scope over a [`Router`].
///
/// Routes registered through a group get the router's global middlewares,
/// then the group's inherited middlewares, then their own handlers. Groups
/// only exist at registration time.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middlewares: Vec<SharedHandler>,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: &str) -> Self {
        Self {
            router,
            prefix: join_paths("", prefix),
            middlewares: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append middlewares for routes and nested groups created from now on.
    pub fn use_middleware<I>(&mut self, handlers: I)
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.middlewares.extend(handlers);
    }

    /// Nested scope: prefixes and middleware lists are concatenated.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            prefix: join_paths(&self.prefix, prefix),
            middlewares: self.middlewares.clone(),
            router: &mut *self.router,
        }
    }

    pub fn get<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::GET, path, handlers)
    }

    pub fn post<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::POST, path, handlers)
    }

    pub fn put<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::PUT, path, handlers)
    }

    pub fn delete<I>(&mut self, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.add(Method::DELETE, path, handlers)
    }

    fn add<I>(&mut self, method: Method, path: &str, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        let chain = self.middlewares.iter().cloned().chain(handlers).collect();
        self.router.add(method, &join_paths(&self.prefix, path), chain)
    }
}

/// Join two path fragments with exactly one `/` between them.
fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{}/{}", prefix, path)
    }
}
