//! websocket-plus server.
//!
//! Serves the built-in `echo` handler group over WebSocket:
//!
//! ```text
//! ws://{bind_address}{path_prefix}/echo
//!     {"type":"ping"}                    → {"type":"pong"}
//!     {"type":"echo","data":{"text":"hi"}} → {"reply":"hi"}
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use websocket_plus::config::{load_config, DispatchConfig};
use websocket_plus::dispatch::{describe, RecoveryArgs};
use websocket_plus::lifecycle::trigger_on_signal;
use websocket_plus::observability::{logging, metrics};
use websocket_plus::{
    BoundArgs, DecodeSettings, DispatchError, Dispatcher, ErrorType, HandlerManifest,
    MessageHandler, ParameterSpec, RecoveryParam, RouteTable, Shutdown, WebSocketServer,
};

#[derive(Parser)]
#[command(name = "websocket-plus")]
#[command(about = "Declarative WebSocket message dispatcher", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

/// Replies to pings and echoes text back.
#[derive(Debug, Default)]
struct EchoHandler;

impl EchoHandler {
    fn ping(&self, _args: &BoundArgs) -> Result<Option<Value>, DispatchError> {
        Ok(Some(json!({ "type": "pong" })))
    }

    fn echo(&self, args: &BoundArgs) -> Result<Option<Value>, DispatchError> {
        let text: String = args.field("text")?;
        Ok(Some(json!({ "reply": text })))
    }

    fn on_error(&self, args: &RecoveryArgs<'_>) -> Result<(), DispatchError> {
        let (Some(session), Some(error)) = (args.session(), args.error()) else {
            return Ok(());
        };
        tracing::warn!(
            session = %describe(session.as_ref()),
            error = %error,
            "Echo request failed"
        );
        let reply = json!({ "error": error.kind().as_str(), "message": error.to_string() });
        session.send_text(reply.to_string())?;
        Ok(())
    }
}

impl MessageHandler for EchoHandler {
    fn manifest(self: Arc<Self>) -> HandlerManifest<Self> {
        HandlerManifest::new("echo", self)
            .route("ping", ["root.type == 'ping'"], vec![], Self::ping)
            .route(
                "echo",
                ["root.type == 'echo'"],
                vec![
                    ParameterSpec::session(),
                    ParameterSpec::field::<String>("text").required(true),
                ],
                Self::echo,
            )
            .recover(
                "on_error",
                ErrorType::Any,
                vec![RecoveryParam::Session, RecoveryParam::Error],
                Self::on_error,
            )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("websocket-plus v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        path_prefix = %config.listener.path_prefix,
        inner_field_key = %config.decode.inner_field_key,
        expression_root = %config.decode.expression_root,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut builder = RouteTable::builder(DecodeSettings::from_config(&config.decode));
    builder.register_handler(Arc::new(EchoHandler))?;
    let dispatcher = Dispatcher::new(builder.build());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(trigger_on_signal(shutdown.clone()));

    WebSocketServer::new(&config.listener, dispatcher, shutdown)
        .run(listener)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
