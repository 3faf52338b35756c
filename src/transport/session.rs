//! WebSocket-backed session handle.

use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::dispatch::{Session, SessionError};

/// A connected WebSocket peer.
///
/// Outgoing text is queued on a bounded channel drained by the connection's
/// writer task. A peer that stops reading fills the queue, and further sends
/// fail with [`SessionError::Full`] instead of buffering without limit.
/// Closing drops the sender, which lets the writer flush what is queued and
/// finish.
#[derive(Debug)]
pub struct WsSession {
    id: String,
    remote: SocketAddr,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl WsSession {
    pub fn new(remote: SocketAddr, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote,
            outbound: Mutex::new(Some(outbound)),
        }
    }

    /// Stop accepting outgoing text.
    pub fn close(&self) {
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.lock().map(|outbound| outbound.is_none()).unwrap_or(true)
    }
}

impl Session for WsSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn send_text(&self, text: String) -> Result<(), SessionError> {
        let outbound = self.outbound.lock().map_err(|e| SessionError::Transport {
            id: self.id.clone(),
            message: e.to_string(),
        })?;
        match outbound.as_ref() {
            Some(tx) => tx.try_send(text).map_err(|e| match e {
                TrySendError::Full(_) => SessionError::Full(self.id.clone()),
                TrySendError::Closed(_) => SessionError::Closed(self.id.clone()),
            }),
            None => Err(SessionError::Closed(self.id.clone())),
        }
    }
}
