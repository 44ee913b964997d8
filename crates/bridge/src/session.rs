//! Headless rendering session.
//!
//! Connects to the bridge's websocket endpoint as a session, receives its
//! role, and when primary runs the executor loop: one command fully
//! completes (mutation, snapshot, response) before the next frame is read.
//! Observers stay connected and only act if a promotion welcome arrives.

use futures_util::{SinkExt, StreamExt};
use molv_protocol::{Lifecycle, Role, ServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::render::StructureSource;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct HeadlessSession {
    ws: WsStream,
    executor: Executor,
    role: Role,
}

impl std::fmt::Debug for HeadlessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessSession")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl HeadlessSession {
    /// Connect to `url` (a `ws://host:port/ws` endpoint) and wait for the
    /// role assignment.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, Executor::new()).await
    }

    /// [`connect`](Self::connect) with a custom structure source.
    pub async fn connect_with_source(url: &str, source: Box<dyn StructureSource>) -> Result<Self> {
        Self::connect_with(url, Executor::with_source(source)).await
    }

    async fn connect_with(url: &str, executor: Executor) -> Result<Self> {
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|err| Error::ConnectionFailed(err.to_string()))?;

        // The first frame must be the lifecycle assignment.
        let role = loop {
            let frame = ws
                .next()
                .await
                .ok_or(Error::ChannelClosed)?
                .map_err(|err| Error::Transport(err.to_string()))?;
            match frame {
                Message::Text(text) => match serde_json::from_str::<Lifecycle>(&text)? {
                    Lifecycle::Welcome { role } => break role,
                    Lifecycle::Rejected { reason } => {
                        return Err(Error::ConnectionFailed(reason));
                    }
                },
                Message::Close(_) => return Err(Error::ChannelClosed),
                _ => continue,
            }
        };
        tracing::info!(target: "molv", ?role, "headless session connected");

        Ok(Self {
            ws,
            executor,
            role,
        })
    }

    /// Role assigned at connect time (may change on promotion during
    /// [`run`](Self::run)).
    pub fn role(&self) -> Role {
        self.role
    }

    /// Run the sequential command loop until the server closes the socket.
    pub async fn run(mut self) -> Result<()> {
        while let Some(frame) = self.ws.next().await {
            let frame = frame.map_err(|err| Error::Transport(err.to_string()))?;
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            match serde_json::from_str::<ServerMessage>(&text)? {
                ServerMessage::Lifecycle(Lifecycle::Welcome { role }) => {
                    tracing::info!(target: "molv", ?role, "session role updated");
                    self.role = role;
                }
                ServerMessage::Lifecycle(Lifecycle::Rejected { reason }) => {
                    return Err(Error::ConnectionFailed(reason));
                }
                ServerMessage::Command(envelope) => {
                    if self.role != Role::Primary {
                        // By invariant the server never sends commands to
                        // observers; drop anything that slips through.
                        tracing::warn!(
                            target: "molv",
                            id = %envelope.correlation_id,
                            "observer received a command; dropping"
                        );
                        continue;
                    }
                    let response = self.executor.handle(envelope);
                    let reply = serde_json::to_string(&response)?;
                    self.ws
                        .send(Message::Text(reply))
                        .await
                        .map_err(|err| Error::Transport(err.to_string()))?;
                }
            }
        }
        Ok(())
    }
}
