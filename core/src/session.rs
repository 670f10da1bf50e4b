/// Per-connection control loop: handshake, inbound event dispatch, cleanup
use crate::error::{ChatError, Result};
use crate::hub::Hub;
use crate::presence::ConnectionHandle;
use crate::protocol::{read_frame, write_event, ClientEvent, ServerEvent};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One live client connection, bound to a verified identity.
pub struct Session {
    hub: Hub,
    conn_id: String,
    addr: SocketAddr,
}

impl Session {
    pub fn new(hub: Hub, addr: SocketAddr) -> Self {
        Self {
            hub,
            conn_id: Uuid::new_v4().to_string(),
            addr,
        }
    }

    /// Drive the connection to completion. Cleanup (Offline mark and
    /// presence unregister) runs unconditionally on every exit path,
    /// whether the client sent `end` or the transport dropped.
    pub async fn run(self, mut stream: TcpStream) -> Result<()> {
        let user_id = match self.handshake(&mut stream).await {
            Ok(user_id) => user_id,
            Err(e) => {
                warn!("Handshake failed with {}: {}", self.addr, e);
                // Best-effort rejection notice before dropping the socket
                let _ = write_event(&mut stream, &ServerEvent::ack_err(&e)).await;
                return Err(e);
            }
        };
        info!("Connection {} authenticated as {}", self.conn_id, user_id);

        let (reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

        self.hub
            .presence()
            .register(
                &user_id,
                ConnectionHandle {
                    conn_id: self.conn_id.clone(),
                    sender: tx.clone(),
                },
            )
            .await;

        // Writer task: acks and dispatched events share one ordered
        // outbound path per connection.
        let writer_conn = self.conn_id.clone();
        let writer_handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = write_event(&mut writer, &event).await {
                    debug!("Write on connection {} failed: {}", writer_conn, e);
                    break;
                }
            }
        });

        let result = self.event_loop(reader, &user_id, &tx).await;

        // Cleanup is idempotent and must not clobber a newer binding
        // for the same user.
        self.hub
            .presence()
            .unregister_conn(&user_id, &self.conn_id)
            .await;
        drop(tx);
        let _ = writer_handle.await;
        info!("Connection {} for {} closed", self.conn_id, user_id);

        result
    }

    /// First frame must carry a previously-issued credential; the raw
    /// client identity is never trusted.
    async fn handshake(&self, stream: &mut TcpStream) -> Result<String> {
        let config = self.hub.config();
        let payload = timeout(
            config.handshake_timeout,
            read_frame(stream, config.max_frame_bytes),
        )
        .await
        .map_err(|_| ChatError::Timeout("Handshake timeout".to_string()))??
        .ok_or_else(|| ChatError::Protocol("Connection closed before handshake".to_string()))?;

        let hello: ClientEvent = serde_json::from_slice(&payload)
            .map_err(|e| ChatError::Protocol(format!("Invalid handshake: {}", e)))?;
        let token = match hello {
            ClientEvent::Hello { token } => token,
            other => {
                return Err(ChatError::Protocol(format!(
                    "Expected hello, got {}",
                    other.event_name()
                )))
            }
        };

        let user_id = self.hub.identity().verify(&token)?;
        write_event(
            stream,
            &ServerEvent::Hello {
                user_id: user_id.clone(),
            },
        )
        .await?;
        Ok(user_id)
    }

    /// Process inbound events one at a time; a failed handler fails
    /// only its own event, never the connection or the process.
    async fn event_loop(
        &self,
        mut reader: tokio::net::tcp::OwnedReadHalf,
        user_id: &str,
        tx: &mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<()> {
        let max_frame_bytes = self.hub.config().max_frame_bytes;

        loop {
            let payload = match read_frame(&mut reader, max_frame_bytes).await {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    debug!("Connection {} closed by peer", self.conn_id);
                    break;
                }
                Err(e) => {
                    warn!("Read error on connection {}: {}", self.conn_id, e);
                    break;
                }
            };

            let event: ClientEvent = match serde_json::from_slice(&payload) {
                Ok(event) => event,
                Err(e) => {
                    let err = ChatError::Protocol(format!("Invalid event: {}", e));
                    debug!("Connection {}: {}", self.conn_id, err);
                    if tx.send(ServerEvent::ack_err(&err)).is_err() {
                        break;
                    }
                    continue;
                }
            };

            match event {
                ClientEvent::End { .. } => {
                    info!("Connection {} ended by {}", self.conn_id, user_id);
                    break;
                }
                ClientEvent::Hello { .. } => {
                    let err =
                        ChatError::Protocol("hello is only valid as the first frame".to_string());
                    if tx.send(ServerEvent::ack_err(&err)).is_err() {
                        break;
                    }
                }
                other => {
                    let name = other.event_name();
                    let ack = match self.hub.handle_event(user_id, other).await {
                        Ok(data) => ServerEvent::ack_ok(data),
                        Err(e) => {
                            error!("Event {} from {} failed: {}", name, user_id, e);
                            ServerEvent::ack_err(&e)
                        }
                    };
                    if tx.send(ack).is_err() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
