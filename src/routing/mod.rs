//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     Router::get/post/put/delete, Group scopes
//!     → global + group middlewares prepended
//!     → trie.rs (insert, duplicate check)
//!     → Router frozen behind Arc
//!
//! Incoming Request (method, path)
//!     → router.rs (pick the method's trie)
//!     → trie.rs (segment walk, wildcard binding)
//!     → Return: RouteMatch { handlers, params, pattern } or RouteNotFound
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex; literal and `:name` segments only
//! - Deterministic: literal segments win over wildcards at the same depth

pub mod group;
pub mod params;
pub mod router;
pub mod trie;

pub use group::Group;
pub use params::Params;
pub use router::Router;
pub use trie::RouteMatch;
