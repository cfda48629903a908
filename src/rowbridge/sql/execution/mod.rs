//! Dataflow execution core.
//!
//! A query runs as a set of operator tasks, one thread of control each,
//! exchanging [`Message`] envelopes over bounded channels and sharing a
//! one-shot cancellation signal.
//!
//! ## Public API
//!
//! - [`Pipeline`] - spawns tasks and tears them down on failure
//! - [`Message`] - the row envelope crossing task boundaries
//! - [`Value`] - the runtime value union
//! - [`processors`] - the Projection / JoinKey / JoinMerge operators

pub mod config;
pub mod expression;
pub mod message;
pub mod pipeline;
pub mod processors;
pub mod task;
pub mod types;

// Re-export public API
pub use config::PipelineConfig;
pub use message::{ContextReader, ContextSimple, ContextUrlValues, Message, SqlDriverMessageMap};
pub use pipeline::Pipeline;
pub use task::{Handled, SigChan, Task, TaskBase};
pub use types::{Value, ValueType};
