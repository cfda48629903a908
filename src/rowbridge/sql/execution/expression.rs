//! Expression evaluation against row contexts.
//!
//! The operators consume expressions through one entry point:
//! [`eval`] returns `Some(value)` on success and `None` when the
//! expression cannot be evaluated against the given row (missing column,
//! incomparable operands). Failure policy is the caller's business — the
//! projection and join operators each apply their own.

use std::cmp::Ordering;

use log::debug;

use crate::rowbridge::sql::ast::{BinaryOperator, Expr};

use super::message::ContextReader;
use super::types::{Value, BOOL_FALSE, BOOL_TRUE};

/// Evaluate an expression against a row reader.
pub fn eval(reader: &dyn ContextReader, expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Column(name) => reader.get(name),
        Expr::Literal(v) => Some(v.clone()),
        Expr::BinaryOp { left, op, right } => {
            let lhs = eval(reader, left)?;
            let rhs = eval(reader, right)?;
            apply_binary(*op, &lhs, &rhs)
        }
    }
}

fn apply_binary(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Option<Value> {
    match op {
        BinaryOperator::Equal => Some(bool_value(values_equal(lhs, rhs))),
        BinaryOperator::NotEqual => Some(bool_value(!values_equal(lhs, rhs))),
        BinaryOperator::LessThan => ordered(lhs, rhs, |o| o == Ordering::Less),
        BinaryOperator::LessThanOrEqual => ordered(lhs, rhs, |o| o != Ordering::Greater),
        BinaryOperator::GreaterThan => ordered(lhs, rhs, |o| o == Ordering::Greater),
        BinaryOperator::GreaterThanOrEqual => ordered(lhs, rhs, |o| o != Ordering::Less),
        BinaryOperator::And => Some(bool_value(as_bool(lhs)? && as_bool(rhs)?)),
        BinaryOperator::Or => Some(bool_value(as_bool(lhs)? || as_bool(rhs)?)),
    }
}

fn ordered<F>(lhs: &Value, rhs: &Value, test: F) -> Option<Value>
where
    F: Fn(Ordering) -> bool,
{
    compare_values(lhs, rhs).map(|o| bool_value(test(o)))
}

/// Equality with numeric widening: ints compare equal to the numbers and
/// times they denote.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if let (Some(a), Some(b)) = (lhs.float_value(), rhs.float_value()) {
        return a == b;
    }
    lhs == rhs
}

/// Three-way comparison where one exists: numeric kinds widen to float,
/// strings and bools compare directly. Mixed kinds are incomparable.
fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        return Some(a.cmp(b));
    }
    if let (Some(a), Some(b)) = (lhs.float_value(), rhs.float_value()) {
        return a.partial_cmp(&b);
    }
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => {
            debug!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            );
            None
        }
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn bool_value(b: bool) -> Value {
    if b {
        BOOL_TRUE
    } else {
        BOOL_FALSE
    }
}
