//! Parameter binding subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     ParameterSpec[] declared per handler method (parameter.rs)
//!     → field of the outer decode type reclassified as OuterPayload
//!
//! Dispatch:
//!     (specs, raw message, session, decoded payload)
//!     → binder.rs (resolve, coerce, validate)
//!     → BoundArgs handed to the handler method
//! ```

pub mod binder;
pub mod parameter;

pub use binder::{Argument, BoundArgs, DecodeSettings, ParameterBinder};
pub use parameter::{ParameterSpec, SourceKind, TypeDescriptor};
