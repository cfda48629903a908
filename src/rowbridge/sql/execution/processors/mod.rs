//! Pipeline operators.
//!
//! - [`Projection`] - per-row column evaluation and `*` expansion
//! - [`JoinKey`] - composite join-key extraction
//! - [`JoinMerge`] - naive partitioned hash join over two keyed streams

pub mod join;
pub mod projection;

pub use join::{JoinKey, JoinMerge};
pub use projection::Projection;
