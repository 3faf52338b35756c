//! WebSocket transport.
//!
//! # Data Flow
//! ```text
//! Client ──upgrade {path_prefix}/{key}──▶ server.rs
//!     text frame → Dispatcher::on_message_for(key, session, frame)
//!     session.send_text → mpsc queue (session.rs) → writer task → Client
//! ```
//!
//! # Design Decisions
//! - The dispatch core sees only the `Session` trait; axum types stay here
//! - One routing key per endpoint path

pub mod server;
pub mod session;

pub use server::WebSocketServer;
pub use session::WsSession;
