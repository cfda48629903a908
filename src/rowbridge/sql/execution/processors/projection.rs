//! Projection operator.
//!
//! Evaluates the selected columns against each input row and emits a fresh
//! write-context per row — the input message is never mutated in place.
//! Per-row failures are local: a column that cannot be evaluated is
//! skipped, an unrecognised message body is dropped, and the row flows on.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};
use tokio::sync::mpsc;

use crate::rowbridge::sql::ast::{Column, SqlSelect};
use crate::rowbridge::sql::error::SqlResult;

use super::super::config::PipelineConfig;
use super::super::expression::eval;
use super::super::message::{ContextReader, ContextSimple, Message};
use super::super::task::{Handled, SigChan, Task, TaskBase};
use super::super::types::Value;

/// Row-by-row projection over a parsed `SELECT`
pub struct Projection {
    base: TaskBase,
    sql: Arc<SqlSelect>,
}

impl Projection {
    pub fn new(sql: SqlSelect) -> Self {
        Projection {
            base: TaskBase::new("Projection"),
            sql: Arc::new(sql),
        }
    }

    pub fn with_config(sql: SqlSelect, config: &PipelineConfig) -> Self {
        Projection {
            base: TaskBase::with_config("Projection", config),
            sql: Arc::new(sql),
        }
    }

    pub fn set_input(&mut self, rx: mpsc::Receiver<Message>) {
        self.base.set_input(rx);
    }

    pub fn take_output(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.base.take_output()
    }

    pub fn close(&self) {
        self.base.close();
    }
}

#[async_trait]
impl Task for Projection {
    fn task_type(&self) -> &'static str {
        self.base.task_type()
    }

    fn sig(&self) -> SigChan {
        self.base.sig()
    }

    fn set_sig(&mut self, sig: SigChan) {
        self.base.set_sig(sig);
    }

    async fn run(&mut self) -> SqlResult<()> {
        let sql = Arc::clone(&self.sql);
        self.base
            .run_handler(move |msg| project_row(&sql.columns, msg))
            .await
    }
}

/// Evaluate every column of one row. Both accepted bodies expose the
/// [`ContextReader`] capability, so one code path serves them; `Star`
/// expansion goes through the reader's row view.
fn project_row(columns: &[Column], msg: Message) -> Handled {
    let reader: &dyn ContextReader = match &msg {
        Message::Row(m) => m,
        Message::Url(m) => m,
        other => {
            error!("could not project message body {}", other.body_name());
            return Handled::Skip;
        }
    };

    let mut out = ContextSimple::new();
    out.id = msg.id();

    for col in columns {
        // column pruned from the output projection
        if col.parent_index.is_none() {
            continue;
        }
        if let Some(guard) = &col.guard {
            match eval(reader, guard) {
                None => {
                    // best effort: the column stays in
                    error!("could not evaluate guard: {}", guard);
                }
                // only an explicit false suppresses the column
                Some(Value::Bool(false)) => continue,
                Some(_) => {}
            }
        }
        if col.star {
            for (key, value) in reader.row() {
                out.put(&Column::named(key), value);
            }
        } else if let Some(expr) = &col.expr {
            match eval(reader, expr) {
                // an ok evaluation is written even when the value is Nil
                Some(value) => out.put(col, value),
                None => warn!("failed eval key={} expr: {}", col.key(), expr),
            }
        }
    }

    Handled::Emit(Message::Simple(out))
}
