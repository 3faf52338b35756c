//! Predicate routing.
//!
//! # Responsibilities
//! - Evaluate a route's expressions against the decoded payload
//! - Select the first matching route of a handler group
//!
//! # Design Decisions
//! - Expressions within a route combine with OR semantics, left to right,
//!   stopping at the first true one
//! - Routes are tried in declaration order; first match wins
//! - An evaluation error aborts selection instead of being read as "false"

use serde_json::Value;

use crate::error::DispatchError;
use crate::expression::ExpressionEvaluator;
use crate::routing::route::{HandlerGroup, MethodRoute};

/// Selects routes by evaluating their expressions.
#[derive(Debug, Clone, Copy)]
pub struct PredicateRouter<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> PredicateRouter<'a> {
    pub fn new(evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { evaluator }
    }

    /// Returns true if any of the route's expressions is true.
    pub fn matches(
        &self,
        route: &MethodRoute,
        root_name: &str,
        payload: &Value,
    ) -> Result<bool, DispatchError> {
        for expression in route.expressions() {
            let matched = self
                .evaluator
                .evaluate(expression, root_name, payload)
                .map_err(|source| DispatchError::Expression {
                    expression: expression.clone(),
                    source,
                })?;
            if matched {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The first route of `group` matching `payload`, or `NoRoute`.
    pub fn select<'g>(
        &self,
        group: &'g HandlerGroup,
        payload: &Value,
    ) -> Result<&'g MethodRoute, DispatchError> {
        let root_name = group.settings().expression_root.as_str();
        for route in group.routes() {
            if self.matches(route, root_name, payload)? {
                return Ok(route);
            }
        }
        Err(DispatchError::NoRoute)
    }
}
