//! Predicate expressions.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     route expressions → ExpressionEvaluator::check(expr, root_name)
//!     (fail fast on bad syntax or a path outside the root)
//!
//! Dispatch:
//!     decoded payload bound to the configured root name
//!     → ExpressionEvaluator::evaluate(expr, root_name, payload)
//!     → bool
//! ```
//!
//! # Design Decisions
//! - The evaluator is a seam: any implementation of `ExpressionEvaluator` can
//!   be plugged into the dispatcher
//! - `SimpleEvaluator` is the built-in language (paths, literals, comparisons,
//!   boolean logic) over `serde_json::Value`
//! - Missing paths evaluate to `null` rather than failing; `null` orders
//!   below every other value, so `root.count > 10` is false when `count` is
//!   absent

pub mod evaluator;
pub mod parser;

use serde_json::Value;
use thiserror::Error;

pub use evaluator::SimpleEvaluator;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    #[error("expected a boolean, found {0}")]
    NotBoolean(String),
}

/// Evaluates boolean predicates against a named root value.
pub trait ExpressionEvaluator: Send + Sync + std::fmt::Debug {
    /// Evaluate `expression` with `root` bound to `root_name`.
    fn evaluate(
        &self,
        expression: &str,
        root_name: &str,
        root: &Value,
    ) -> Result<bool, ExpressionError>;

    /// Check that `expression` is well formed and only refers to `root_name`,
    /// without evaluating it. Called once per expression at registration.
    fn check(&self, _expression: &str, _root_name: &str) -> Result<(), ExpressionError> {
        Ok(())
    }
}
