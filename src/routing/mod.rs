//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     HandlerManifest[] (manifest.rs)
//!     → table.rs (check keys, expressions, parameter names)
//!     → fingerprint.rs (reject duplicate expression sets)
//!     → Freeze as immutable RouteTable of HandlerGroups (route.rs)
//!
//! Dispatch (per message):
//!     decoded payload
//!     → predicate.rs (evaluate expressions in declaration order)
//!     → Return: matched MethodRoute or NoRoute
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No two routes anywhere in the table share an expression set
//! - Deterministic: same payload always matches the same route
//! - First match wins (declaration order)

pub mod fingerprint;
pub mod manifest;
pub mod predicate;
pub mod route;
pub mod table;

pub use fingerprint::Fingerprint;
pub use manifest::{HandlerManifest, MessageHandler};
pub use predicate::PredicateRouter;
pub use route::{ExceptionRoute, HandlerGroup, MethodRoute, MethodTarget, RecoveryTarget};
pub use table::{RouteTable, RouteTableBuilder};
