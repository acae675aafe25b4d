//! Segment trie for a single HTTP method.
//!
//! # Responsibilities
//! - Insert route patterns segment by segment
//! - Reject patterns that collide with an existing terminal node
//! - Resolve a request path to a terminal node and bind wildcard params
//!
//! # Design Decisions
//! - Literal segments compare case-insensitively; `:name` segments are
//!   wildcards kept verbatim
//! - Request segments are percent-decoded one at a time, so an encoded `/`
//!   stays inside its segment
//! - Matching recurses one segment at a time and backtracks on failure
//! - Literal children are tried before wildcard children, each group in
//!   insertion order
//! - Duplicate detection walks the trie by segment shape, so `/u/:id` and
//!   `/u/:name` collide while `/u/:id` and `/u/list` coexist

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::http::handler::{HandlerChain, SharedHandler};
use crate::routing::params::Params;

const WILDCARD_MARKER: char = ':';

fn is_wildcard(segment: &str) -> bool {
    segment.starts_with(WILDCARD_MARKER)
}

/// Strip one leading and one trailing `/`.
fn trim_slashes(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path)
}

fn segments(path: &str) -> Vec<&str> {
    let trimmed = trim_slashes(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// A resolved route: the handler chain, bound params and the pattern it was
/// registered under.
#[derive(Clone)]
pub struct RouteMatch {
    pub handlers: HandlerChain,
    pub params: Params,
    pub pattern: String,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

struct Node {
    segment: String,
    /// Lowercased literal, or the wildcard verbatim.
    key: String,
    terminal: bool,
    handlers: HandlerChain,
    pattern: String,
    children: Vec<Node>,
}

impl Node {
    fn new(segment: &str) -> Self {
        let key = if is_wildcard(segment) {
            segment.to_string()
        } else {
            segment.to_lowercase()
        };
        Self {
            segment: segment.to_string(),
            key,
            terminal: false,
            handlers: Arc::from(Vec::new()),
            pattern: String::new(),
            children: Vec::new(),
        }
    }

    fn is_wildcard(&self) -> bool {
        is_wildcard(&self.segment)
    }

    fn param_name(&self) -> &str {
        &self.segment[WILDCARD_MARKER.len_utf8()..]
    }

    /// Child that an insertion of `segment` would reuse.
    fn child_position(&self, segment: &str) -> Option<usize> {
        if is_wildcard(segment) {
            self.children.iter().position(|c| c.segment == segment)
        } else {
            let key = segment.to_lowercase();
            self.children
                .iter()
                .position(|c| !c.is_wildcard() && c.key == key)
        }
    }

    /// Walk by segment shape: literals by value, any wildcard for a wildcard.
    fn find_shape(&self, segments: &[&str]) -> Option<&Node> {
        let Some((head, rest)) = segments.split_first() else {
            return self.terminal.then_some(self);
        };

        if is_wildcard(head) {
            self.children
                .iter()
                .filter(|c| c.is_wildcard())
                .find_map(|c| c.find_shape(rest))
        } else {
            let key = head.to_lowercase();
            self.children
                .iter()
                .filter(|c| !c.is_wildcard() && c.key == key)
                .find_map(|c| c.find_shape(rest))
        }
    }

    /// Match `path` (no leading slash) against this node's children.
    fn match_node<'a>(
        &'a self,
        path: &'a str,
        bound: &mut Vec<(&'a str, Cow<'a, str>)>,
    ) -> Option<&'a Node> {
        let (raw, tail) = match path.split_once('/') {
            Some((head, tail)) => (head, Some(tail)),
            None => (path, None),
        };
        let head = percent_decode_str(raw).decode_utf8_lossy();

        let wildcard_head = is_wildcard(raw);
        let key = head.to_lowercase();
        let literals = self
            .children
            .iter()
            .filter(|c| !c.is_wildcard() && (wildcard_head || c.key == key));
        let wildcards = self.children.iter().filter(|c| c.is_wildcard());

        for child in literals.chain(wildcards) {
            let mark = bound.len();
            if child.is_wildcard() {
                bound.push((child.param_name(), head.clone()));
            }

            let found = match tail {
                None => child.terminal.then_some(child),
                Some(rest) => child.match_node(rest, bound),
            };
            if found.is_some() {
                return found;
            }
            bound.truncate(mark);
        }

        None
    }

    fn collect_patterns<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.terminal {
            out.push(&self.pattern);
        }
        for child in &self.children {
            child.collect_patterns(out);
        }
    }
}

/// Prefix tree holding every route registered for one method.
pub struct Tree {
    method: Method,
    root: Node,
}

impl Tree {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            root: Node::new(""),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Insert `path` with its handler chain.
    ///
    /// Fails without touching the trie when an equivalent pattern exists.
    pub fn add_route(&mut self, path: &str, handlers: Vec<SharedHandler>) -> Result<()> {
        let segments = segments(path);

        if segments.iter().any(|s| *s == ":") {
            return Err(Error::InvalidRoute {
                path: path.to_string(),
                reason: "wildcard segment has no name",
            });
        }

        if self.root.find_shape(&segments).is_some() {
            return Err(Error::DuplicateRoute {
                method: self.method.clone(),
                path: path.to_string(),
            });
        }

        let mut node = &mut self.root;
        for segment in &segments {
            let index = match node.child_position(segment) {
                Some(index) => index,
                None => {
                    node.children.push(Node::new(segment));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }

        node.terminal = true;
        node.handlers = Arc::from(handlers);
        node.pattern = path.to_string();
        Ok(())
    }

    /// Resolve a request path to its route and wildcard params.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        let trimmed = trim_slashes(path);
        let mut bound = Vec::new();

        let found = if trimmed.is_empty() {
            self.root.terminal.then_some(&self.root)
        } else {
            self.root.match_node(trimmed, &mut bound)
        };
        let node = found?;

        Some(RouteMatch {
            handlers: Arc::clone(&node.handlers),
            params: bound.into_iter().collect(),
            pattern: node.pattern.clone(),
        })
    }

    /// Registered patterns in trie order.
    pub fn patterns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.root.collect_patterns(&mut out);
        out
    }
}
