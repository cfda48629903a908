//! AST contracts the execution core consumes from the parser.
//!
//! The planner hands the runtime a pruned [`SqlSelect`] per source: columns
//! carry both their position in the source row ([`Column::source_index`])
//! and their position in the output row ([`Column::parent_index`], `None`
//! when the column is pruned from the output).

use std::fmt;

use crate::rowbridge::sql::execution::types::Value;

/// Binary operators understood by the expression evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        };
        write!(f, "{}", op)
    }
}

/// Expression tree node evaluated against a row context
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a named column in the row
    Column(String),
    /// Literal value
    Literal(Value),
    /// Binary operation between two sub-expressions
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op, right),
        }
    }
}

/// A selected column within a `SELECT` statement.
///
/// `source_index` is the column's position in the *input* row;
/// `parent_index` is its position in the *output* row after column pruning,
/// `None` meaning the column is read (e.g. for a join key) but dropped from
/// the output.
#[derive(Debug, Clone)]
pub struct Column {
    /// Output alias (`SELECT expr AS alias`)
    pub as_name: String,
    /// Position in the source row layout
    pub source_index: usize,
    /// Position in the output row layout, `None` when pruned
    pub parent_index: Option<usize>,
    /// `SELECT *` marker; expands every input column
    pub star: bool,
    /// Optional boolean guard; an explicit false suppresses the column
    pub guard: Option<Expr>,
    /// Expression producing the column value
    pub expr: Option<Expr>,
}

impl Column {
    /// Column selecting a named field, positioned in both row layouts.
    pub fn new(name: impl Into<String>, source_index: usize, parent_index: usize) -> Self {
        let name = name.into();
        Column {
            expr: Some(Expr::Column(name.clone())),
            as_name: name,
            source_index,
            parent_index: Some(parent_index),
            star: false,
            guard: None,
        }
    }

    /// Synthetic output-only column carrying just an alias. Star expansion
    /// writes each input pair under one of these.
    pub fn named(name: impl Into<String>) -> Self {
        Column {
            as_name: name.into(),
            source_index: 0,
            parent_index: Some(0),
            star: false,
            guard: None,
            expr: None,
        }
    }

    /// `SELECT *` column.
    pub fn star() -> Self {
        Column {
            as_name: String::new(),
            source_index: 0,
            parent_index: Some(0),
            star: true,
            guard: None,
            expr: None,
        }
    }

    /// Attach a guard expression.
    pub fn with_guard(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Key this column is addressed by in alias maps and write contexts.
    pub fn key(&self) -> &str {
        &self.as_name
    }
}

/// A parsed `SELECT` statement (pruned to what the runtime needs)
#[derive(Debug, Clone, Default)]
pub struct SqlSelect {
    pub columns: Vec<Column>,
    pub from: Vec<SqlSource>,
}

impl SqlSelect {
    pub fn new(columns: Vec<Column>) -> Self {
        SqlSelect {
            columns,
            from: Vec::new(),
        }
    }
}

/// One `FROM` clause entry, possibly a join participant
#[derive(Debug, Clone, Default)]
pub struct SqlSource {
    /// Table alias used to qualify this source's columns downstream
    pub alias: String,
    /// The rewritten sub-select describing this source's row layout
    pub source: Option<Box<SqlSelect>>,
    /// Join expressions; evaluated per row to build the composite join key
    pub join_nodes: Vec<Expr>,
}

impl SqlSource {
    pub fn new(alias: impl Into<String>, source: SqlSelect, join_nodes: Vec<Expr>) -> Self {
        SqlSource {
            alias: alias.into(),
            source: Some(Box::new(source)),
            join_nodes,
        }
    }
}
