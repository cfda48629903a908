//! SQL-over-arbitrary-sources bridge.
//!
//! This library evaluates SQL `SELECT` statements (projection and joins)
//! as a dataflow of independently running tasks connected by bounded
//! message channels. Parsers and datasource drivers are external
//! collaborators; this crate is the execution core they plug into.

pub mod rowbridge;

// Re-export main API
pub use rowbridge::sql::error::{SqlError, SqlResult};
pub use rowbridge::sql::execution::{Message, Pipeline, Value, ValueType};
