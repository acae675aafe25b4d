//! Chain middlewares.
//!
//! Each constructor returns a [`SharedHandler`](crate::http::SharedHandler)
//! that does its "before" work, awaits `ctx.next()`, then its "after" work.

pub mod cost;
pub mod recovery;

pub use cost::cost;
pub use recovery::recovery;
