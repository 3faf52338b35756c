//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! transport (session.rs: Session + InboundMessage)
//!     → dispatcher.rs (decode, route, bind, invoke, send)
//!     → on failure: exception.rs (first compatible recovery method)
//! ```
//!
//! # Design Decisions
//! - The route table is shared read-only; dispatch takes no locks
//! - Failures never escape a single message: the session stays open

pub mod dispatcher;
pub mod exception;
pub mod session;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use exception::{ErrorType, ExceptionRouter, RecoveryArgs, RecoveryArgument, RecoveryParam};
pub use session::{describe, InboundMessage, Session, SessionError, SessionHandle};
