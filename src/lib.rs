//! Declarative WebSocket message dispatch.
//!
//! Handler objects describe their routes in a [`routing::HandlerManifest`]:
//! a routing key, methods guarded by predicate expressions over the decoded
//! payload, and recovery methods for dispatch errors. The manifests are
//! frozen into a [`routing::RouteTable`], and a [`dispatch::Dispatcher`]
//! routes each inbound text message to exactly one method, binds its
//! arguments and sends the serialized result back on the session.

pub mod binding;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expression;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod transport;

pub use binding::{BoundArgs, DecodeSettings, ParameterSpec};
pub use config::DispatchConfig;
pub use dispatch::{
    DispatchOutcome, Dispatcher, ErrorType, RecoveryArgs, RecoveryParam, Session, SessionHandle,
};
pub use error::{DispatchError, ErrorKind, HandlerError, RegistrationError};
pub use lifecycle::Shutdown;
pub use routing::{HandlerManifest, MessageHandler, RouteTable, RouteTableBuilder};
pub use transport::WebSocketServer;
