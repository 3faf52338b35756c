//! Built-in expression evaluator over JSON values.

use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use super::parser::{parse, CompareOp, Expr, Segment};
use super::{ExpressionError, ExpressionEvaluator};

/// Evaluates expressions written in the built-in predicate language.
///
/// The decoded payload is visible under the configured root name, either
/// bare (`root.type == 'ping'`) or prefixed (`#root.type == 'ping'`).
///
/// Expressions accepted by [`check`](ExpressionEvaluator::check) are kept
/// parsed, so routes registered through the table builder are parsed once.
#[derive(Debug, Default)]
pub struct SimpleEvaluator {
    parsed: DashMap<String, Arc<Expr>>,
}

impl SimpleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of expressions held in parsed form.
    pub fn parsed_len(&self) -> usize {
        self.parsed.len()
    }

    fn lookup(&self, expression: &str) -> Result<Arc<Expr>, ExpressionError> {
        match self.parsed.get(expression) {
            Some(expr) => Ok(Arc::clone(expr.value())),
            None => parse(expression).map(Arc::new),
        }
    }
}

impl ExpressionEvaluator for SimpleEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        root_name: &str,
        root: &Value,
    ) -> Result<bool, ExpressionError> {
        let expr = self.lookup(expression)?;
        let scope = Scope { root_name, root };
        match scope.eval(&expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::NotBoolean(describe(&other))),
        }
    }

    fn check(&self, expression: &str, root_name: &str) -> Result<(), ExpressionError> {
        let expr = self.lookup(expression)?;
        check_variables(&expr, root_name)?;
        self.parsed.insert(expression.to_string(), expr);
        Ok(())
    }
}

/// Every path must start at the root variable.
fn check_variables(expr: &Expr, root_name: &str) -> Result<(), ExpressionError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Path { variable, .. } if variable == root_name => Ok(()),
        Expr::Path { variable, .. } => Err(ExpressionError::UnknownVariable(variable.clone())),
        Expr::Not(inner) => check_variables(inner, root_name),
        Expr::And(l, r) | Expr::Or(l, r) | Expr::Compare(l, _, r) => {
            check_variables(l, root_name)?;
            check_variables(r, root_name)
        }
    }
}

struct Scope<'a> {
    root_name: &'a str,
    root: &'a Value,
}

impl Scope<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path { variable, segments } => self.resolve(variable, segments),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner)?)),
            // Both sides short-circuit like their boolean counterparts.
            Expr::And(l, r) => Ok(Value::Bool(self.eval_bool(l)? && self.eval_bool(r)?)),
            Expr::Or(l, r) => Ok(Value::Bool(self.eval_bool(l)? || self.eval_bool(r)?)),
            Expr::Compare(l, op, r) => {
                let left = self.eval(l)?;
                let right = self.eval(r)?;
                compare(&left, *op, &right).map(Value::Bool)
            }
        }
    }

    fn eval_bool(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::NotBoolean(describe(&other))),
        }
    }

    fn resolve(&self, variable: &str, segments: &[Segment]) -> Result<Value, ExpressionError> {
        if variable != self.root_name {
            return Err(ExpressionError::UnknownVariable(variable.to_string()));
        }
        let mut current = self.root;
        for segment in segments {
            let next = match segment {
                Segment::Key(key) => current.get(key.as_str()),
                Segment::Index(index) => current.get(*index),
            };
            match next {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Eq => Ok(loosely_equal(left, right)),
        CompareOp::Ne => Ok(!loosely_equal(left, right)),
        _ => {
            let ordering = order(left, right)?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Numbers compare by value so that `1 == 1.0`.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// `null` orders below every other value.
fn order(left: &Value, right: &Value) -> Result<Ordering, ExpressionError> {
    let ordering = match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| ExpressionError::TypeMismatch {
        left: describe(left),
        right: describe(right),
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
