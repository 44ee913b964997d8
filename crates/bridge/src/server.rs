//! The bridge's transport endpoint.
//!
//! Axum surface: `GET /` serves the execution-context bootstrap page,
//! `GET /ws` upgrades to the session socket, `POST /api/command` dispatches
//! one command and returns the snapshot for controllers that prefer HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Html;
use axum::routing::{get, post};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use molv_protocol::{
    Command, Lifecycle, ResponseEnvelope, ResponseOutcome, Role, decode_image, encode_image,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::correlate::CorrelationTable;
use crate::dispatch::{DEFAULT_TIMEOUT, Dispatcher};
use crate::error::{Error, Result};
use crate::registry::{RegistryPolicy, SessionId, SessionRegistry};
use crate::snapshot::Snapshot;

const VIEWER_HTML: &str = include_str!("../assets/viewer.html");

/// Bridge endpoint configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Per-call dispatch deadline.
    pub timeout: Duration,
    pub policy: RegistryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            timeout: DEFAULT_TIMEOUT,
            policy: RegistryPolicy::default(),
        }
    }
}

/// The assembled bridge: session registry, correlation table and dispatcher
/// behind one transport endpoint.
pub struct Bridge {
    registry: Arc<SessionRegistry>,
    dispatcher: Dispatcher,
    table: Arc<CorrelationTable>,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new(config.policy));
        let table = Arc::new(CorrelationTable::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&table), config.timeout);
        Arc::new(Self {
            registry,
            dispatcher,
            table,
            config,
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Dispatch a command to the primary session.
    pub async fn dispatch(&self, command: Command) -> Result<Snapshot> {
        self.dispatcher.dispatch(command).await
    }

    /// Dispatch with an explicit per-call deadline.
    pub async fn dispatch_with_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Snapshot> {
        self.dispatcher.dispatch_with_timeout(command, timeout).await
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", get(|| async { Html(VIEWER_HTML) }))
            .route(
                "/ws",
                get(
                    |ws: WebSocketUpgrade, State(bridge): State<Arc<Bridge>>| async move {
                        ws.on_upgrade(|socket| handle_session_socket(socket, bridge))
                    },
                ),
            )
            .route("/api/command", post(handle_api_command))
            .with_state(Arc::clone(self))
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                Error::ConnectionFailed(format!(
                    "invalid host/port combination: {}:{}",
                    self.config.host, self.config.port
                ))
            })?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener (lets callers bind port 0).
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(target: "molv", %addr, "starting bridge endpoint");
        axum::serve(listener, self.router().into_make_service())
            .await
            .map_err(Error::Io)
    }
}

async fn handle_session_socket(socket: WebSocket, bridge: Arc<Bridge>) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();

    let (id, role) = match bridge.registry.register(outbound_tx.clone()) {
        Ok(assigned) => assigned,
        Err(err) => {
            // Strict policy: tell the session why, then drop the socket.
            let rejection = Lifecycle::Rejected {
                reason: err.to_string(),
            };
            let mut socket = socket;
            if let Ok(frame) = serde_json::to_string(&rejection) {
                let _ = socket.send(Message::Text(frame.into())).await;
            }
            warn!(target: "molv", error = %err, "session registration refused");
            return;
        }
    };

    debug!(target: "molv", session = %id, ?role, "welcoming session");
    if let Ok(frame) = serde_json::to_string(&Lifecycle::Welcome { role }) {
        let _ = outbound_tx.send(frame);
    }

    let mut outbound = UnboundedReceiverStream::new(outbound_rx);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.next().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_session_frame(&bridge, id, &text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(target: "molv", session = %id, error = %err, "session websocket error");
                break;
            }
        }
    }

    // Pending calls for a vanished primary are left to their own deadlines;
    // the dispatcher reports Timeout rather than hanging.
    if let Some(promoted) = bridge.registry.disconnect(id) {
        let welcome = Lifecycle::Welcome {
            role: Role::Primary,
        };
        if let Ok(frame) = serde_json::to_string(&welcome) {
            let _ = promoted.send(frame);
        }
    }
    send_task.abort();
}

fn handle_session_frame(bridge: &Bridge, id: SessionId, raw: &str) {
    // Only the primary session answers dispatched commands; a frame from an
    // observer must never resolve a pending call.
    if bridge.registry.current_primary().is_none_or(|p| p.id != id) {
        warn!(target: "molv", session = %id, "ignoring response from non-primary session");
        return;
    }

    let envelope: ResponseEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(target: "molv", session = %id, error = %err, "malformed response envelope");
            return;
        }
    };

    let correlation_id = envelope.correlation_id;
    let outcome = match envelope.outcome {
        ResponseOutcome::Ok { image } => match decode_image(&image) {
            Ok(bytes) => Ok(Snapshot::new(bytes)),
            Err(err) => Err(Error::Protocol(format!("invalid snapshot payload: {err}"))),
        },
        ResponseOutcome::Error { message } => Err(Error::RemoteExecution { message }),
    };

    if !bridge.table.resolve(correlation_id, outcome) {
        // Late or duplicate response after its deadline fired: logged and
        // dropped, never delivered to another waiter.
        warn!(
            target: "molv",
            session = %id,
            id = %correlation_id,
            "dropping response with no pending call"
        );
    }
}

/// Body answered by `POST /api/command`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn handle_api_command(
    State(bridge): State<Arc<Bridge>>,
    Json(command): Json<Command>,
) -> Json<ApiResponse> {
    match bridge.dispatch(command).await {
        Ok(snapshot) => Json(ApiResponse {
            success: true,
            image: Some(encode_image(&snapshot.bytes)),
            error: None,
        }),
        Err(err) => Json(ApiResponse {
            success: false,
            image: None,
            error: Some(err.to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_the_primary_session_resolves_pending_calls() {
        let bridge = Bridge::new(BridgeConfig::default());
        let (primary_id, _) = bridge
            .registry
            .register(mpsc::unbounded_channel().0)
            .unwrap();
        let (observer_id, _) = bridge
            .registry
            .register(mpsc::unbounded_channel().0)
            .unwrap();

        let (id, rx, mut guard) = bridge.table.register();
        let frame =
            serde_json::to_string(&ResponseEnvelope::ok(id, encode_image(b"\x89PNG"))).unwrap();

        // An observer frame carrying a valid correlation id is warn-dropped.
        handle_session_frame(&bridge, observer_id, &frame);
        assert_eq!(bridge.table.pending_len(), 1);

        handle_session_frame(&bridge, primary_id, &frame);
        assert!(rx.await.unwrap().is_ok());
        guard.complete();
    }
}
