//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;

use websocket_plus::config::ListenerConfig;
use websocket_plus::dispatch::{Session, SessionError, SessionHandle};
use websocket_plus::{Dispatcher, Shutdown, WebSocketServer};

/// In-memory session that records everything sent to it.
#[derive(Debug)]
pub struct RecordingSession {
    id: String,
    sent: Mutex<Vec<String>>,
}

impl RecordingSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn handle(self: &Arc<Self>) -> SessionHandle {
        self.clone()
    }
}

impl Session for RecordingSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_text(&self, text: String) -> Result<(), SessionError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }
}

/// Serve `dispatcher` on an ephemeral port with the default `/ws` prefix.
pub async fn start_server(dispatcher: Dispatcher) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = WebSocketServer::new(&ListenerConfig::default(), dispatcher, shutdown.clone());
    tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}
