//! Per-message dispatch.
//!
//! # Responsibilities
//! - Decode each text message and select one route across the table
//! - Bind arguments, invoke the method and send its serialized result
//! - Contain every failure to the message that caused it
//!
//! # Data Flow
//! ```text
//! Received ──decode──▶ Routed ──bind──▶ Bound ──invoke──▶ Invoked ──send──▶ Sent
//!     │                  │                │                  │
//!     └──────────────────┴────────────────┴──────────────────┴──▶ Failed
//!                                                                   → ExceptionRouter
//! ```
//!
//! # Design Decisions
//! - Dispatch is synchronous on the caller's task; no internal pool
//! - `NoRoute` is a normal outcome: nothing is sent and nothing is reported
//! - At most one `send_text` per inbound message

use std::sync::Arc;

use serde_json::Value;

use crate::binding::ParameterBinder;
use crate::dispatch::exception::ExceptionRouter;
use crate::dispatch::session::{describe, InboundMessage, SessionHandle};
use crate::error::DispatchError;
use crate::observability::metrics;
use crate::routing::{HandlerGroup, MethodRoute, PredicateRouter, RouteTable};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A response was sent.
    Sent,
    /// The method ran and returned nothing.
    NoResponse,
    /// No route matched.
    Unmatched,
    /// Not a text frame.
    Ignored,
    /// Dispatch failed; `handled` tells whether a recovery method took the error.
    Failed { handled: bool },
}

impl DispatchOutcome {
    /// Label used in metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::NoResponse => "no_response",
            DispatchOutcome::Unmatched => "unmatched",
            DispatchOutcome::Ignored => "ignored",
            DispatchOutcome::Failed { .. } => "failed",
        }
    }
}

/// Routes inbound messages through a frozen route table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
}

impl Dispatcher {
    pub fn new(table: RouteTable) -> Self {
        Self { table: Arc::new(table) }
    }

    pub fn from_shared(table: Arc<RouteTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Dispatch `message` against every group, in registration order.
    pub fn on_message(&self, session: &SessionHandle, message: &InboundMessage) -> DispatchOutcome {
        let outcome = self.dispatch(self.table.groups().iter(), session, message);
        metrics::record_message(outcome.as_str());
        outcome
    }

    /// Dispatch `message` against the group registered under `key` only.
    pub fn on_message_for(
        &self,
        key: &str,
        session: &SessionHandle,
        message: &InboundMessage,
    ) -> DispatchOutcome {
        let outcome = match self.table.get(key) {
            Some(group) => self.dispatch(std::iter::once(group), session, message),
            None => {
                tracing::debug!(
                    session = %describe(session.as_ref()),
                    key,
                    "No handler group for key"
                );
                DispatchOutcome::Unmatched
            }
        };
        metrics::record_message(outcome.as_str());
        outcome
    }

    /// Report a transport failure to the recovery methods of group `key`.
    pub fn on_transport_error(
        &self,
        key: &str,
        session: &SessionHandle,
        error: DispatchError,
    ) -> bool {
        match self.table.get(key) {
            Some(group) => ExceptionRouter::new(group).handle(session, &error),
            None => {
                tracing::warn!(
                    session = %describe(session.as_ref()),
                    key,
                    error = %error,
                    "Transport error"
                );
                false
            }
        }
    }

    pub fn on_connected(&self, session: &SessionHandle) {
        tracing::debug!(session = %describe(session.as_ref()), "Session connected");
    }

    pub fn on_closed(&self, session: &SessionHandle) {
        tracing::debug!(session = %describe(session.as_ref()), "Session closed");
    }

    fn dispatch<'g>(
        &self,
        groups: impl Iterator<Item = &'g HandlerGroup>,
        session: &SessionHandle,
        message: &InboundMessage,
    ) -> DispatchOutcome {
        let Some(text) = message.as_text() else {
            return DispatchOutcome::Ignored;
        };

        let router = PredicateRouter::new(self.table.evaluator());
        for group in groups {
            let selected = group
                .settings()
                .decode_outer(text)
                .and_then(|payload| router.select(group, &payload).map(|route| (route, payload)));

            let result = match selected {
                Ok((route, payload)) => self.run(group, route, session, message, &payload),
                Err(DispatchError::NoRoute) => continue,
                Err(e) => Err(e),
            };
            return match result {
                Ok(outcome) => outcome,
                Err(e) => DispatchOutcome::Failed {
                    handled: ExceptionRouter::new(group).handle(session, &e),
                },
            };
        }

        tracing::debug!(session = %describe(session.as_ref()), "No route matched message");
        DispatchOutcome::Unmatched
    }

    fn run(
        &self,
        group: &HandlerGroup,
        route: &MethodRoute,
        session: &SessionHandle,
        message: &InboundMessage,
        payload: &Value,
    ) -> Result<DispatchOutcome, DispatchError> {
        let args = ParameterBinder::new(group.settings()).bind(
            route.parameters(),
            message,
            session,
            payload,
        )?;

        let result = match route.invoke(&args)? {
            Some(result) if !result.is_null() => result,
            _ => {
                tracing::warn!(
                    session = %describe(session.as_ref()),
                    key = %group.key(),
                    method = %route.name(),
                    "Method returned no result"
                );
                return Ok(DispatchOutcome::NoResponse);
            }
        };

        let text = serde_json::to_string(&result).map_err(DispatchError::Encode)?;
        tracing::info!(
            session = %describe(session.as_ref()),
            key = %group.key(),
            method = %route.name(),
            payload = %text,
            "Send message"
        );
        session.send_text(text)?;
        Ok(DispatchOutcome::Sent)
    }
}
