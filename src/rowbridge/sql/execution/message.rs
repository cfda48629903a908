//! Message envelopes and row contexts crossing task boundaries.
//!
//! Every edge in a pipeline carries [`Message`] values. The join operators
//! require the positional [`SqlDriverMessageMap`] body; projection accepts
//! anything exposing the [`ContextReader`] capability and emits a fresh
//! [`ContextSimple`] write-context per row.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::rowbridge::sql::ast::Column;

use super::types::Value;

/// Key-indexed read access to a row's named values
pub trait ContextReader {
    /// Look up one named value. `None` means the key is absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// Materialize the whole row as name/value pairs.
    fn row(&self) -> HashMap<String, Value>;
}

/// Ordered positional row plus an alias-to-index map and the hash key slot
/// the join operators fill in.
#[derive(Debug, Clone)]
pub struct SqlDriverMessageMap {
    /// Mutable id slot; join merge renumbers merged rows through it
    pub id: u64,
    values: Vec<Value>,
    col_index: Arc<HashMap<String, usize>>,
    key: String,
}

impl SqlDriverMessageMap {
    pub fn new(id: u64, values: Vec<Value>, col_index: Arc<HashMap<String, usize>>) -> Self {
        SqlDriverMessageMap {
            id,
            values,
            col_index,
            key: String::new(),
        }
    }

    /// The positional row values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Shared alias-to-position map for this row layout.
    pub fn col_index(&self) -> &Arc<HashMap<String, usize>> {
        &self.col_index
    }

    /// The composite join key, empty until a key-extraction task sets it.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Install the composite join key downstream consumers hash and merge on.
    pub fn set_key_hashed(&mut self, key: String) {
        self.key = key;
    }
}

impl ContextReader for SqlDriverMessageMap {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(&idx) = self.col_index.get(key) {
            return self.values.get(idx).cloned();
        }
        // Bare lookups may address qualified "alias.key" entries; merged
        // join rows are indexed that way.
        if !key.contains('.') {
            for (qualified, &idx) in self.col_index.iter() {
                if qualified
                    .rsplit_once('.')
                    .map(|(_, bare)| bare == key)
                    .unwrap_or(false)
                {
                    return self.values.get(idx).cloned();
                }
            }
        }
        None
    }

    fn row(&self) -> HashMap<String, Value> {
        let mut row = HashMap::with_capacity(self.col_index.len());
        for (alias, &idx) in self.col_index.iter() {
            match self.values.get(idx) {
                Some(v) => {
                    row.insert(alias.clone(), v.clone());
                }
                None => warn!(
                    "column {} indexes position {} outside row of {} values",
                    alias,
                    idx,
                    self.values.len()
                ),
            }
        }
        row
    }
}

/// Name-keyed write context; the output body of projection
#[derive(Debug, Clone, Default)]
pub struct ContextSimple {
    pub id: u64,
    data: HashMap<String, Value>,
}

impl ContextSimple {
    pub fn new() -> Self {
        ContextSimple::default()
    }

    /// Write one projected value under the column's output key. Columns
    /// without an alias fall back to their expression's string form.
    pub fn put(&mut self, col: &Column, v: Value) {
        if !col.as_name.is_empty() {
            self.data.insert(col.as_name.clone(), v);
            return;
        }
        match &col.expr {
            Some(expr) => {
                self.data.insert(expr.to_string(), v);
            }
            None => warn!("dropping projected value with no output key"),
        }
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }
}

impl ContextReader for ContextSimple {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).cloned()
    }

    fn row(&self) -> HashMap<String, Value> {
        self.data.clone()
    }
}

/// CGI-style multi-valued input context. Single-valued keys read as
/// `String`, multi-valued ones as `Strings`.
#[derive(Debug, Clone, Default)]
pub struct ContextUrlValues {
    pub id: u64,
    data: HashMap<String, Vec<String>>,
}

impl ContextUrlValues {
    pub fn new(data: HashMap<String, Vec<String>>) -> Self {
        ContextUrlValues { id: 0, data }
    }

    fn lift(vals: &[String]) -> Option<Value> {
        match vals.len() {
            0 => None,
            1 => Some(Value::String(vals[0].clone())),
            _ => Some(Value::Strings(vals.to_vec())),
        }
    }
}

impl ContextReader for ContextUrlValues {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).and_then(|v| Self::lift(v))
    }

    fn row(&self) -> HashMap<String, Value> {
        self.data
            .iter()
            .filter_map(|(k, v)| Self::lift(v).map(|val| (k.clone(), val)))
            .collect()
    }
}

/// The envelope carrying one row between tasks
#[derive(Debug, Clone)]
pub enum Message {
    /// Positional row; the only body the join operators accept
    Row(SqlDriverMessageMap),
    /// Multi-valued name-keyed input row
    Url(ContextUrlValues),
    /// Name-keyed output of projection
    Simple(ContextSimple),
}

impl Message {
    /// Stable row id.
    pub fn id(&self) -> u64 {
        match self {
            Message::Row(m) => m.id,
            Message::Url(m) => m.id,
            Message::Simple(m) => m.id,
        }
    }

    /// Overwrite the row id; downstream operators renumber merged rows.
    pub fn set_id(&mut self, id: u64) {
        match self {
            Message::Row(m) => m.id = id,
            Message::Url(m) => m.id = id,
            Message::Simple(m) => m.id = id,
        }
    }

    /// Body name for diagnostics.
    pub fn body_name(&self) -> &'static str {
        match self {
            Message::Row(_) => "SqlDriverMessageMap",
            Message::Url(_) => "ContextUrlValues",
            Message::Simple(_) => "ContextSimple",
        }
    }
}
