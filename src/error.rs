//! Error taxonomy for registration and dispatch.
//!
//! # Design Decisions
//! - Registration errors are fatal: the route table is never built half-way
//! - Dispatch errors are contained to the message being processed
//! - `ErrorKind` carries a parent chain so exception routes can target a
//!   family of errors (e.g. every binding failure) or a single leaf

use thiserror::Error;

use crate::dispatch::SessionError;
use crate::expression::ExpressionError;

/// Boxed error returned by handler methods.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building the route table.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// A handler method is declared in a way that cannot be served.
    #[error("invalid declaration on `{key}::{method}`: {reason}")]
    Configuration {
        key: String,
        method: String,
        reason: String,
    },

    /// Two routes share the same expression set.
    #[error(
        "expressions {expressions:?} on `{key}::{method}` conflict with an already registered \
         route ({fingerprint})"
    )]
    ExpressionConflict {
        key: String,
        method: String,
        expressions: Vec<String>,
        fingerprint: String,
    },

    /// Two handler groups share the same routing key.
    #[error("routing key `{0}` is already registered")]
    DuplicateKey(String),
}

impl RegistrationError {
    /// Whether this error is one of the conflict variants.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RegistrationError::ExpressionConflict { .. } | RegistrationError::DuplicateKey(_)
        )
    }
}

/// Errors raised while dispatching a single inbound message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route expression matched the payload.
    #[error("no handler applicable to the message")]
    NoRoute,

    /// The payload could not be decoded into the expected shape.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// A route expression could not be evaluated.
    #[error("expression `{expression}` failed: {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExpressionError,
    },

    /// A required field is absent and has no default.
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),

    /// Nested validation of a bound field failed.
    #[error("{field} {message}")]
    Validation { field: String, message: String },

    /// A handler asked for an argument the route does not bind.
    #[error("argument `{0}` is not available")]
    Argument(String),

    /// The handler method itself failed.
    #[error("handler failed: {0}")]
    Handler(HandlerError),

    /// A handler result could not be serialized.
    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),

    /// The session failed while reading or writing.
    #[error(transparent)]
    Transport(#[from] SessionError),
}

impl DispatchError {
    /// The leaf kind of this error, used for exception routing.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::NoRoute => ErrorKind::Routing,
            DispatchError::Decode(_) => ErrorKind::Decode,
            DispatchError::Expression { .. } => ErrorKind::Expression,
            DispatchError::MissingParameter(_) => ErrorKind::MissingParameter,
            DispatchError::Validation { .. } => ErrorKind::Validation,
            DispatchError::Argument(_) => ErrorKind::Binding,
            DispatchError::Handler(_) => ErrorKind::Handler,
            DispatchError::Encode(_) => ErrorKind::Encode,
            DispatchError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Convert a handler error, unboxing it if it already is a `DispatchError`.
    pub fn from_handler(err: HandlerError) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(inner) => *inner,
            Err(other) => DispatchError::Handler(other),
        }
    }
}

/// Classification of dispatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Routing,
    Decode,
    Expression,
    Binding,
    MissingParameter,
    Validation,
    Handler,
    Encode,
    Transport,
}

impl ErrorKind {
    /// The more general kind this one belongs to, if any.
    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::MissingParameter | ErrorKind::Validation => Some(ErrorKind::Binding),
            _ => None,
        }
    }

    /// Whether an error of kind `self` can be handled by a route declared for `target`.
    pub fn is_a(self, target: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == target {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Routing => "routing",
            ErrorKind::Decode => "decode",
            ErrorKind::Expression => "expression",
            ErrorKind::Binding => "binding",
            ErrorKind::MissingParameter => "missing_parameter",
            ErrorKind::Validation => "validation",
            ErrorKind::Handler => "handler",
            ErrorKind::Encode => "encode",
            ErrorKind::Transport => "transport",
        }
    }
}
