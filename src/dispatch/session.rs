//! Session handle and inbound message types.
//!
//! # Responsibilities
//! - Abstract the transport's connection behind a `Session` trait
//! - Represent the raw inbound frame handed to the dispatcher
//!
//! # Design Decisions
//! - Sending is synchronous: transports queue the text and write it from
//!   their own task, so dispatch never awaits the socket

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised when writing to a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session {0} is closed")]
    Closed(String),

    #[error("outbound queue of session {0} is full")]
    Full(String),

    #[error("transport error on session {id}: {message}")]
    Transport { id: String, message: String },
}

/// A connected peer that text payloads can be sent to.
pub trait Session: Send + Sync + fmt::Debug {
    /// Unique identifier of this connection.
    fn id(&self) -> &str;

    /// Peer address, when the transport knows it.
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Queue a text payload for the peer.
    fn send_text(&self, text: String) -> Result<(), SessionError>;
}

/// Shared handle to a session.
pub type SessionHandle = Arc<dyn Session>;

/// Render a session as `remote@id` for logs.
pub fn describe(session: &dyn Session) -> String {
    match session.remote_addr() {
        Some(addr) => format!("{}@{}", addr, session.id()),
        None => format!("unknown@{}", session.id()),
    }
}

/// A frame received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

impl InboundMessage {
    /// The text payload, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InboundMessage::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for InboundMessage {
    fn from(text: &str) -> Self {
        InboundMessage::Text(text.to_string())
    }
}

impl From<String> for InboundMessage {
    fn from(text: String) -> Self {
        InboundMessage::Text(text)
    }
}
