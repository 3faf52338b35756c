//! Compiled routes and handler groups.
//!
//! Everything here is built once during registration and only read while
//! serving.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::binding::{BoundArgs, DecodeSettings, ParameterSpec};
use crate::dispatch::exception::{ErrorType, RecoveryArgs, RecoveryParam};
use crate::error::{DispatchError, HandlerError};
use crate::routing::fingerprint::Fingerprint;

/// Type-erased handler method, bound to its owning instance.
pub type MethodTarget =
    Arc<dyn Fn(&BoundArgs) -> Result<Option<Value>, DispatchError> + Send + Sync>;

/// Type-erased error-recovery method, bound to its owning instance.
pub type RecoveryTarget = Arc<dyn Fn(&RecoveryArgs<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// A routable handler method.
#[derive(Clone)]
pub struct MethodRoute {
    pub(crate) name: String,
    pub(crate) expressions: Vec<String>,
    pub(crate) parameters: Vec<ParameterSpec>,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) target: MethodTarget,
}

impl MethodRoute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expressions in declaration order; the route matches if any is true.
    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Call the method. `Ok(None)` means the method produced no response.
    pub fn invoke(&self, args: &BoundArgs) -> Result<Option<Value>, DispatchError> {
        (self.target)(args)
    }
}

impl fmt::Debug for MethodRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRoute")
            .field("name", &self.name)
            .field("expressions", &self.expressions)
            .field("parameters", &self.parameters)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// An error-recovery method.
#[derive(Clone)]
pub struct ExceptionRoute {
    pub(crate) name: String,
    pub(crate) error_type: ErrorType,
    pub(crate) parameters: Vec<RecoveryParam>,
    pub(crate) target: RecoveryTarget,
}

impl ExceptionRoute {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn error_type(&self) -> &ErrorType {
        &self.error_type
    }

    pub fn parameters(&self) -> &[RecoveryParam] {
        &self.parameters
    }

    pub fn invoke(&self, args: &RecoveryArgs<'_>) -> Result<(), HandlerError> {
        (self.target)(args)
    }
}

impl fmt::Debug for ExceptionRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionRoute")
            .field("name", &self.name)
            .field("error_type", &self.error_type)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// All routes registered for one routing key.
#[derive(Debug, Clone)]
pub struct HandlerGroup {
    pub(crate) key: String,
    pub(crate) settings: DecodeSettings,
    pub(crate) routes: Vec<MethodRoute>,
    pub(crate) exception_routes: Vec<ExceptionRoute>,
}

impl HandlerGroup {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn settings(&self) -> &DecodeSettings {
        &self.settings
    }

    /// Method routes in declaration order.
    pub fn routes(&self) -> &[MethodRoute] {
        &self.routes
    }

    /// Exception routes in declaration order.
    pub fn exception_routes(&self) -> &[ExceptionRoute] {
        &self.exception_routes
    }
}
