//! Exception routing.
//!
//! # Responsibilities
//! - Describe the error types recovery methods declare
//! - Pick the first recovery method compatible with a dispatch error
//! - Bind the error and session into the recovery method's parameters
//!
//! # Design Decisions
//! - First match in declaration order, not most specific: a route for
//!   `Binding` declared before one for `Validation` takes validation errors
//! - Handling is best-effort: a failing recovery method is logged, never
//!   propagated

use std::error::Error;
use std::fmt;

use crate::dispatch::session::{describe, SessionHandle};
use crate::error::{DispatchError, ErrorKind};
use crate::observability::metrics;
use crate::routing::{ExceptionRoute, HandlerGroup};

type HandlerErrorRef<'a> = &'a (dyn Error + Send + Sync + 'static);

/// The error type an exception route is declared for.
#[derive(Clone, Copy)]
pub enum ErrorType {
    /// Every dispatch error.
    Any,
    /// Errors of this kind or of any kind below it.
    Kind(ErrorKind),
    /// Handler failures whose boxed error is the named concrete type.
    Handler {
        name: &'static str,
        matches: fn(HandlerErrorRef<'_>) -> bool,
    },
}

impl ErrorType {
    /// Handler failures caused by the concrete error type `E`.
    pub fn of<E: Error + 'static>() -> Self {
        ErrorType::Handler {
            name: std::any::type_name::<E>(),
            matches: is_handler_error::<E>,
        }
    }

    /// Whether an exception route declared for `self` accepts `error`.
    pub fn is_assignable_from(&self, error: &DispatchError) -> bool {
        match self {
            ErrorType::Any => true,
            ErrorType::Kind(kind) => error.kind().is_a(*kind),
            ErrorType::Handler { matches, .. } => match error {
                DispatchError::Handler(inner) => matches(inner.as_ref()),
                _ => false,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorType::Any => "any",
            ErrorType::Kind(kind) => kind.as_str(),
            ErrorType::Handler { name, .. } => *name,
        }
    }
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorType({})", self.name())
    }
}

impl PartialEq for ErrorType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ErrorType::Any, ErrorType::Any) => true,
            (ErrorType::Kind(a), ErrorType::Kind(b)) => a == b,
            (ErrorType::Handler { name: a, .. }, ErrorType::Handler { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

fn is_handler_error<E: Error + 'static>(error: HandlerErrorRef<'_>) -> bool {
    error.is::<E>()
}

/// A declared parameter of a recovery method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryParam {
    /// Receives the error.
    Error,
    /// Receives the session the failing message arrived on.
    Session,
    /// Any other parameter; always left unset.
    Other,
}

/// A bound recovery argument.
#[derive(Debug, Clone, Copy)]
pub enum RecoveryArgument<'a> {
    Error(&'a DispatchError),
    Session(&'a SessionHandle),
    Unset,
}

/// Arguments for one recovery invocation, in declaration order.
#[derive(Debug, Clone)]
pub struct RecoveryArgs<'a> {
    values: Vec<RecoveryArgument<'a>>,
}

impl<'a> RecoveryArgs<'a> {
    /// Only the first `Error` and the first `Session` parameter receive a value.
    pub fn bind(
        params: &[RecoveryParam],
        session: &'a SessionHandle,
        error: &'a DispatchError,
    ) -> Self {
        let mut error_bound = false;
        let mut session_bound = false;
        let values = params
            .iter()
            .map(|param| match param {
                RecoveryParam::Error if !error_bound => {
                    error_bound = true;
                    RecoveryArgument::Error(error)
                }
                RecoveryParam::Session if !session_bound => {
                    session_bound = true;
                    RecoveryArgument::Session(session)
                }
                _ => RecoveryArgument::Unset,
            })
            .collect();
        Self { values }
    }

    pub fn error(&self) -> Option<&'a DispatchError> {
        self.values.iter().find_map(|value| match value {
            RecoveryArgument::Error(error) => Some(*error),
            _ => None,
        })
    }

    pub fn session(&self) -> Option<&'a SessionHandle> {
        self.values.iter().find_map(|value| match value {
            RecoveryArgument::Session(session) => Some(*session),
            _ => None,
        })
    }

    pub fn get(&self, index: usize) -> Option<&RecoveryArgument<'a>> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Routes dispatch errors of one handler group to its recovery methods.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionRouter<'a> {
    key: &'a str,
    routes: &'a [ExceptionRoute],
}

impl<'a> ExceptionRouter<'a> {
    pub fn new(group: &'a HandlerGroup) -> Self {
        Self {
            key: group.key(),
            routes: group.exception_routes(),
        }
    }

    /// The first route declared for a type assignable from `error`.
    pub fn select(&self, error: &DispatchError) -> Option<&'a ExceptionRoute> {
        self.routes
            .iter()
            .find(|route| route.error_type().is_assignable_from(error))
    }

    /// Hand `error` to the first compatible recovery method.
    ///
    /// Returns `true` if a recovery method was selected, even if it failed.
    pub fn handle(&self, session: &SessionHandle, error: &DispatchError) -> bool {
        let kind = error.kind().as_str();
        let Some(route) = self.select(error) else {
            tracing::warn!(
                session = %describe(session.as_ref()),
                key = %self.key,
                kind,
                error = %error,
                "Unhandled dispatch error"
            );
            metrics::record_unhandled_error(kind);
            return false;
        };

        let args = RecoveryArgs::bind(route.parameters(), session, error);
        if let Err(e) = route.invoke(&args) {
            tracing::error!(
                session = %describe(session.as_ref()),
                key = %self.key,
                method = %route.name(),
                error = %e,
                "Recovery method failed"
            );
        } else {
            tracing::debug!(
                session = %describe(session.as_ref()),
                key = %self.key,
                method = %route.name(),
                kind,
                "Dispatch error recovered"
            );
        }
        metrics::record_recovered_error(kind);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::DecodeSettings;
    use crate::dispatch::session::{Session, SessionError};
    use crate::error::HandlerError;
    use crate::routing::RecoveryTarget;
    use std::sync::{Arc, Mutex};
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("quota exceeded")]
    struct QuotaExceeded;

    #[derive(Debug, Error)]
    #[error("rate limited")]
    struct RateLimited;

    #[derive(Debug)]
    struct NullSession;

    impl Session for NullSession {
        fn id(&self) -> &str {
            "null"
        }

        fn send_text(&self, _text: String) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn recording_route(
        name: &str,
        error_type: ErrorType,
        calls: Arc<Mutex<Vec<String>>>,
    ) -> ExceptionRoute {
        let label = name.to_string();
        let target: RecoveryTarget =
            Arc::new(move |args: &RecoveryArgs<'_>| -> Result<(), HandlerError> {
                let error = args.error().map(|e| e.to_string()).unwrap_or_default();
                calls.lock().unwrap().push(format!("{label}: {error}"));
                Ok(())
            });
        ExceptionRoute {
            name: name.to_string(),
            error_type,
            parameters: vec![RecoveryParam::Session, RecoveryParam::Error],
            target,
        }
    }

    fn group(exception_routes: Vec<ExceptionRoute>) -> HandlerGroup {
        HandlerGroup {
            key: "test".into(),
            settings: DecodeSettings::default(),
            routes: Vec::new(),
            exception_routes,
        }
    }

    #[test]
    fn test_assignability() {
        let validation = DispatchError::Validation {
            field: "name".into(),
            message: "empty".into(),
        };
        assert!(ErrorType::Any.is_assignable_from(&validation));
        assert!(ErrorType::Kind(ErrorKind::Binding).is_assignable_from(&validation));
        assert!(ErrorType::Kind(ErrorKind::Validation).is_assignable_from(&validation));
        assert!(!ErrorType::Kind(ErrorKind::Handler).is_assignable_from(&validation));

        let quota = DispatchError::Handler(Box::new(QuotaExceeded));
        assert!(ErrorType::of::<QuotaExceeded>().is_assignable_from(&quota));
        assert!(!ErrorType::of::<RateLimited>().is_assignable_from(&quota));
        assert!(ErrorType::Kind(ErrorKind::Handler).is_assignable_from(&quota));
        assert!(!ErrorType::of::<QuotaExceeded>().is_assignable_from(&validation));
    }

    #[test]
    fn test_first_match_not_most_specific() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let group = group(vec![
            recording_route("on_binding", ErrorType::Kind(ErrorKind::Binding), calls.clone()),
            recording_route("on_validation", ErrorType::Kind(ErrorKind::Validation), calls.clone()),
        ]);
        let session: SessionHandle = Arc::new(NullSession);
        let error = DispatchError::Validation {
            field: "name".into(),
            message: "must not be empty".into(),
        };

        assert!(ExceptionRouter::new(&group).handle(&session, &error));
        assert_eq!(*calls.lock().unwrap(), vec!["on_binding: name must not be empty".to_string()]);
    }

    #[test]
    fn test_unhandled_error_is_dropped() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let group = group(vec![recording_route(
            "on_quota",
            ErrorType::of::<QuotaExceeded>(),
            calls.clone(),
        )]);
        let session: SessionHandle = Arc::new(NullSession);

        let error = DispatchError::MissingParameter("text".into());
        let handled = ExceptionRouter::new(&group).handle(&session, &error);
        assert!(!handled);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_recovery_argument_binding() {
        let session: SessionHandle = Arc::new(NullSession);
        let error = DispatchError::NoRoute;
        let params = [
            RecoveryParam::Other,
            RecoveryParam::Error,
            RecoveryParam::Session,
            RecoveryParam::Error,
            RecoveryParam::Session,
        ];
        let args = RecoveryArgs::bind(&params, &session, &error);

        assert_eq!(args.len(), 5);
        assert!(matches!(args.get(0), Some(RecoveryArgument::Unset)));
        assert!(matches!(args.get(1), Some(RecoveryArgument::Error(_))));
        assert!(matches!(args.get(2), Some(RecoveryArgument::Session(_))));
        assert!(matches!(args.get(3), Some(RecoveryArgument::Unset)));
        assert!(matches!(args.get(4), Some(RecoveryArgument::Unset)));
        assert_eq!(args.session().map(|s| s.id()), Some("null"));
    }

    #[test]
    fn test_failing_recovery_still_counts_as_handled() {
        let target: RecoveryTarget =
            Arc::new(|_: &RecoveryArgs<'_>| -> Result<(), HandlerError> { Err("boom".into()) });
        let group = group(vec![ExceptionRoute {
            name: "explode".into(),
            error_type: ErrorType::Any,
            parameters: Vec::new(),
            target,
        }]);
        let session: SessionHandle = Arc::new(NullSession);
        assert!(ExceptionRouter::new(&group).handle(&session, &DispatchError::NoRoute));
    }
}
