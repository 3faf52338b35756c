//! WebSocket server.
//!
//! # Responsibilities
//! - Serve one WebSocket endpoint per routing key at `{path_prefix}/{key}`
//! - Feed every inbound frame to the dispatcher, scoped to the endpoint's key
//! - Write queued responses from a per-connection task
//! - Close sessions on shutdown
//!
//! # Design Decisions
//! - Unknown keys are rejected with 404 before the upgrade
//! - Reading and dispatching happen on the connection task; writing happens
//!   on its own task so a dispatch never waits on the socket
//! - The outbound queue is bounded by `listener.outbound_queue`; a send to a
//!   full queue fails and reaches the group's recovery methods
//! - A read error ends the connection after being routed to the group's
//!   recovery methods

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;

use crate::config::ListenerConfig;
use crate::dispatch::{Dispatcher, InboundMessage, SessionError, SessionHandle};
use crate::error::DispatchError;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::transport::session::WsSession;

/// State injected into the upgrade handler.
#[derive(Clone)]
struct AppState {
    dispatcher: Dispatcher,
    shutdown: Shutdown,
    outbound_queue: usize,
}

/// WebSocket front end for a dispatcher.
pub struct WebSocketServer {
    router: Router,
    shutdown: Shutdown,
}

impl WebSocketServer {
    pub fn new(config: &ListenerConfig, dispatcher: Dispatcher, shutdown: Shutdown) -> Self {
        for key in dispatcher.table().keys() {
            tracing::debug!(path = %endpoint_path(&config.path_prefix, key), "WebSocket endpoint");
        }
        let state = AppState {
            dispatcher,
            shutdown: shutdown.clone(),
            outbound_queue: config.outbound_queue.max(1),
        };
        let router = Self::build_router(&config.path_prefix, state);
        Self { router, shutdown }
    }

    fn build_router(path_prefix: &str, state: AppState) -> Router {
        Router::new()
            .route(&endpoint_path(path_prefix, "{key}"), get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Accept connections on `listener` until shutdown is triggered.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "WebSocket server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.signalled())
            .await?;

        tracing::info!("WebSocket server stopped");
        Ok(())
    }
}

fn endpoint_path(path_prefix: &str, key: &str) -> String {
    format!("{}/{}", path_prefix.trim_end_matches('/'), key)
}

async fn ws_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.dispatcher.table().contains_key(&key) {
        tracing::debug!(remote = %addr, key = %key, "Unknown routing key");
        return (StatusCode::NOT_FOUND, "unknown routing key").into_response();
    }
    // Subscribed before the handshake completes, so no trigger is missed.
    let shutdown_rx = state.shutdown.subscribe();
    let outbound_queue = state.outbound_queue;
    ws.on_upgrade(move |socket| {
        handle_socket(socket, key, addr, state.dispatcher, outbound_queue, shutdown_rx)
    })
}

async fn handle_socket(
    socket: WebSocket,
    key: String,
    addr: SocketAddr,
    dispatcher: Dispatcher,
    outbound_queue: usize,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(outbound_queue);

    let ws_session = Arc::new(WsSession::new(addr, tx));
    let session: SessionHandle = ws_session.clone();
    metrics::session_opened();
    dispatcher.on_connected(&session);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                return Err(e);
            }
        }
        sink.close().await
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(message)) => match to_inbound(message) {
                    Some(inbound) => {
                        dispatcher.on_message_for(&key, &session, &inbound);
                    }
                    None => break,
                },
                None => break,
                Some(Err(e)) => {
                    let error = DispatchError::Transport(SessionError::Transport {
                        id: session.id().to_string(),
                        message: e.to_string(),
                    });
                    dispatcher.on_transport_error(&key, &session, error);
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }

    ws_session.close();
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let error = DispatchError::Transport(SessionError::Transport {
                id: session.id().to_string(),
                message: e.to_string(),
            });
            dispatcher.on_transport_error(&key, &session, error);
        }
        Err(e) => tracing::error!(key = %key, error = %e, "Writer task failed"),
    }

    dispatcher.on_closed(&session);
    metrics::session_closed();
}

/// `None` for a close frame.
fn to_inbound(message: Message) -> Option<InboundMessage> {
    let inbound = match message {
        Message::Text(text) => InboundMessage::Text(text.as_str().to_owned()),
        Message::Binary(data) => InboundMessage::Binary(data.to_vec()),
        Message::Ping(data) => InboundMessage::Ping(data.to_vec()),
        Message::Pong(data) => InboundMessage::Pong(data.to_vec()),
        Message::Close(_) => return None,
    };
    Some(inbound)
}
