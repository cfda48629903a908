// SQL module for rowbridge
// AST contracts consumed from the parser plus the dataflow execution core.

pub mod ast;
pub mod error;
pub mod execution;

// Re-export main API
pub use ast::{BinaryOperator, Column, Expr, SqlSelect, SqlSource};
pub use error::{SqlError, SqlResult};
pub use execution::{Message, Value, ValueType};
