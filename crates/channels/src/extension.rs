//! WebSocket endpoint the browser extension connects to.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use browserpilot_core::{BridgeNotice, Error, InboundFrame, Result};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::correlator::{CommandCorrelator, FrameOutcome};

/// Reply sent for every `task` frame, before the task is queued.
pub const TASK_ACK_MESSAGE: &str = "Connection OK!";

const OUTBOUND_BUFFER: usize = 64;

#[derive(Clone)]
struct BridgeState {
    correlator: Arc<CommandCorrelator>,
    task_tx: mpsc::Sender<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    executor_connected: bool,
    busy: bool,
    version: String,
}

pub struct ExtensionServer {
    state: BridgeState,
}

impl ExtensionServer {
    /// `task_tx` receives the text of every non-empty `task` frame.
    pub fn new(correlator: Arc<CommandCorrelator>, task_tx: mpsc::Sender<String>) -> Self {
        Self {
            state: BridgeState {
                correlator,
                task_tx,
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handle_ws_upgrade))
            .route("/ws", get(handle_ws_upgrade))
            .route("/health", get(handle_health))
            .layer(CorsLayer::permissive().allow_credentials(false))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
        let bind_addr = format!("{}:{}", host, port);
        TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to bind {}: {}", bind_addr, e)))
    }

    /// Serve until `shutdown` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(addr = ?addr, "Extension bridge listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;
        info!("Extension bridge stopped");
        Ok(())
    }
}

async fn handle_health(State(state): State<BridgeState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        executor_connected: state.correlator.is_connected(),
        busy: state.correlator.is_busy(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    // Screenshots arrive as large base64 text frames.
    ws.max_message_size(64 << 20)
        .on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: BridgeState) {
    info!("Browser extension connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let send_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let link_id = state.correlator.attach(Arc::new(out_tx.clone()));

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "WebSocket receive error");
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => handle_text(&state, &out_tx, &text).await,
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    state.correlator.detach(link_id);
    send_task.abort();
    info!("Browser extension disconnected");
}

async fn handle_text(state: &BridgeState, out_tx: &mpsc::Sender<String>, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, len = text.len(), "Malformed frame from extension");
            return;
        }
    };

    match frame {
        InboundFrame::Task { task, .. } => {
            let ack = BridgeNotice::Response {
                message: TASK_ACK_MESSAGE.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&ack) {
                let _ = out_tx.send(json).await;
            }
            let task = task.unwrap_or_default();
            let task = task.trim();
            if task.is_empty() {
                debug!("Empty task frame acknowledged");
                return;
            }
            info!(task = %task, "Task received from extension");
            // Never block the reader: a running session needs it for replies.
            match state.task_tx.try_send(task.to_string()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => warn!("Task queue full; task dropped"),
                Err(mpsc::error::TrySendError::Closed(_)) => warn!("Task queue closed; task dropped"),
            }
        }
        frame => {
            let kind = frame.kind();
            let outcome = state.correlator.handle_frame(frame);
            if outcome != FrameOutcome::Resolved {
                debug!(kind, outcome = ?outcome, "Frame not delivered");
            }
        }
    }
}
