//! Join operators: key extraction and naive merge.
//!
//! A join runs as three tasks. Each input stream passes through a
//! [`JoinKey`] task that evaluates the source's join expressions per row
//! and installs a composite key on the message:
//!
//! ```text
//!   source1   ->  JoinKey  ->
//!                             \
//!                              --  JoinMerge  -->
//!                             /
//!   source2   ->  JoinKey  ->
//! ```
//!
//! [`JoinMerge`] materialises both keyed streams into hash tables and emits
//! the cartesian product per matching key — an INNER equi-join with no
//! spilling, which is what makes it the naive merge.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::rowbridge::sql::ast::{Column, Expr, SqlSource};
use crate::rowbridge::sql::error::{SqlError, SqlResult};

use super::super::config::PipelineConfig;
use super::super::expression::eval;
use super::super::message::{ContextReader, Message, SqlDriverMessageMap};
use super::super::task::{SigChan, Task, TaskBase};
use super::super::types::Value;

/// Delimiter between composite key parts. NUL cannot appear in the string
/// form of a join value, so composites never collide.
const KEY_DELIMITER: &str = "\u{0}";

/// Build the composite join key for one row: the string form of every join
/// expression, NUL-delimited. `None` when any expression fails to evaluate.
fn composite_key(reader: &dyn ContextReader, join_nodes: &[Expr]) -> Option<String> {
    let mut parts = Vec::with_capacity(join_nodes.len());
    for node in join_nodes {
        match eval(reader, node) {
            Some(v) => parts.push(v.to_string()),
            None => {
                error!("could not evaluate join node: {}", node);
                return None;
            }
        }
    }
    Some(parts.join(KEY_DELIMITER))
}

/// Evaluates the compound join key per row so downstream merges (and any
/// hash routing between them) see a consistent key.
pub struct JoinKey {
    base: TaskBase,
    from: Arc<SqlSource>,
}

impl JoinKey {
    pub fn new(from: SqlSource) -> Self {
        JoinKey {
            base: TaskBase::new("JoinKey"),
            from: Arc::new(from),
        }
    }

    pub fn with_config(from: SqlSource, config: &PipelineConfig) -> Self {
        JoinKey {
            base: TaskBase::with_config("JoinKey", config),
            from: Arc::new(from),
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
impl Task for JoinKey {
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
        let out = self.base.take_sender()?;
        let mut input = self.base.take_input()?;
        let sig = self.base.sig();
        let join_nodes = self.from.join_nodes.clone();

        loop {
            tokio::select! {
                _ = sig.cancelled() => {
                    debug!("JoinKey: got signal quit");
                    return Ok(());
                }
                msg = input.recv() => {
                    let Some(msg) = msg else {
                        return Ok(());
                    };
                    match msg {
                        Message::Row(mut m) => {
                            let Some(key) = composite_key(&m, &join_nodes) else {
                                // observable but not fatal: drop the row
                                continue;
                            };
                            m.set_key_hashed(key);
                            tokio::select! {
                                _ = sig.cancelled() => return Ok(()),
                                sent = out.send(Message::Row(m)) => {
                                    if sent.is_err() {
                                        debug!("JoinKey: downstream closed");
                                        return Ok(());
                                    }
                                }
                            }
                        }
                        other => {
                            sig.close();
                            return Err(SqlError::execution_error(
                                format!(
                                    "to use JoinKey must use SqlDriverMessageMap but got {}",
                                    other.body_name()
                                ),
                                None,
                            ));
                        }
                    }
                }
            }
        }
    }
}

type SideTable = HashMap<String, Vec<SqlDriverMessageMap>>;

/// Drain one side of the join into its hash table. Rows with an empty key
/// or the wrong body are structural violations: the worker closes the
/// shared signal and returns the error so the whole pipeline tears down.
async fn ingest(
    side: &'static str,
    mut input: mpsc::Receiver<Message>,
    sig: SigChan,
) -> SqlResult<SideTable> {
    let mut table = SideTable::new();
    loop {
        tokio::select! {
            _ = sig.cancelled() => {
                warn!("join {} ingest: got signal quit", side);
                return Ok(table);
            }
            msg = input.recv() => {
                let Some(msg) = msg else {
                    return Ok(table);
                };
                match msg {
                    Message::Row(m) => {
                        if m.key().is_empty() {
                            sig.close();
                            return Err(SqlError::execution_error(
                                format!(
                                    "to use Join msgs must have keys but got \"\" for {:?}",
                                    m.row()
                                ),
                                None,
                            ));
                        }
                        // append preserves arrival order per key
                        table.entry(m.key().to_string()).or_default().push(m);
                    }
                    other => {
                        sig.close();
                        return Err(SqlError::execution_error(
                            format!(
                                "to use Join must use SqlDriverMessageMap but got {}",
                                other.body_name()
                            ),
                            None,
                        ));
                    }
                }
            }
        }
    }
}

/// A naive parallel join merge: materialises both keyed inputs, then emits
/// the cartesian product per matching key, re-indexing each side's values
/// into the fused output row layout.
pub struct JoinMerge {
    base: TaskBase,
    left_in: Option<mpsc::Receiver<Message>>,
    right_in: Option<mpsc::Receiver<Message>>,
    left: Arc<SqlSource>,
    right: Arc<SqlSource>,
}

impl JoinMerge {
    /// `left_in` / `right_in` are the outbound channels of the two upstream
    /// [`JoinKey`] tasks.
    pub fn new(
        left_in: mpsc::Receiver<Message>,
        right_in: mpsc::Receiver<Message>,
        left: SqlSource,
        right: SqlSource,
    ) -> Self {
        JoinMerge {
            base: TaskBase::new("JoinNaiveMerge"),
            left_in: Some(left_in),
            right_in: Some(right_in),
            left: Arc::new(left),
            right: Arc::new(right),
        }
    }

    pub fn take_output(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.base.take_output()
    }

    pub fn close(&self) {
        self.base.close();
    }

    /// Fuse both sides' column layouts into the output row layout:
    /// `"alias.key"` to the column's position in the merged row.
    fn build_col_index(&self) -> HashMap<String, usize> {
        let mut col_index = HashMap::new();
        for side in [&self.left, &self.right] {
            let Some(source) = &side.source else { continue };
            for col in &source.columns {
                match col.parent_index {
                    Some(idx) => {
                        col_index.insert(format!("{}.{}", side.alias, col.key()), idx);
                    }
                    None => debug!("column {} pruned from join output", col.key()),
                }
            }
        }
        col_index
    }
}

#[async_trait]
impl Task for JoinMerge {
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
        let out = self.base.take_sender()?;
        let sig = self.base.sig();

        // read-only after this point; workers and emission share it
        let col_index = Arc::new(self.build_col_index());

        let left_in = self
            .left_in
            .take()
            .ok_or_else(|| SqlError::stream_error("JoinNaiveMerge", "left input not wired"))?;
        let right_in = self
            .right_in
            .take()
            .ok_or_else(|| SqlError::stream_error("JoinNaiveMerge", "right input not wired"))?;

        // one worker per side; each owns its table until the barrier
        let left_worker = tokio::spawn(ingest("left", left_in, sig.clone()));
        let right_worker = tokio::spawn(ingest("right", right_in, sig.clone()));
        let (left_res, right_res) = tokio::join!(left_worker, right_worker);
        let left_table = flatten_worker(left_res)?;
        let right_table = flatten_worker(right_res)?;

        if sig.is_closed() {
            return Ok(());
        }

        let left_cols = side_columns(&self.left);
        let right_cols = side_columns(&self.right);

        let mut next_id: u64 = 0;
        for (key, left_msgs) in &left_table {
            let Some(right_msgs) = right_table.get(key) else {
                continue;
            };
            for lm in left_msgs {
                for rm in right_msgs {
                    let mut vals = vec![Value::Nil; col_index.len()];
                    val_indexing(&mut vals, lm.values(), left_cols);
                    val_indexing(&mut vals, rm.values(), right_cols);
                    let mut merged =
                        SqlDriverMessageMap::new(next_id, vals, Arc::clone(&col_index));
                    merged.set_key_hashed(key.clone());
                    next_id += 1;
                    tokio::select! {
                        _ = sig.cancelled() => {
                            debug!("JoinNaiveMerge: got signal quit during emit");
                            return Ok(());
                        }
                        sent = out.send(Message::Row(merged)) => {
                            if sent.is_err() {
                                debug!("JoinNaiveMerge: downstream closed");
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn side_columns(side: &SqlSource) -> &[Column] {
    side.source
        .as_ref()
        .map(|s| s.columns.as_slice())
        .unwrap_or(&[])
}

fn flatten_worker(
    joined: Result<SqlResult<SideTable>, tokio::task::JoinError>,
) -> SqlResult<SideTable> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(SqlError::stream_error(
            "JoinNaiveMerge",
            format!("ingest worker aborted: {}", e),
        )),
    }
}

/// Copy one side's values into the merged output row by position:
/// `out[parent_index] = src[source_index]` for every retained column.
fn val_indexing(out: &mut [Value], src: &[Value], cols: &[Column]) {
    for col in cols {
        let Some(parent) = col.parent_index else {
            continue;
        };
        if parent >= out.len() {
            warn!(
                "not enough values to write col? i={} len(vals)={}",
                parent,
                out.len()
            );
            continue;
        }
        match src.get(col.source_index) {
            Some(v) => out[parent] = v.clone(),
            None => warn!(
                "not enough values to read col? i={} len(vals)={}",
                col.source_index,
                src.len()
            ),
        }
    }
}
