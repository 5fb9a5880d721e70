//! Per-connection WebSocket driver
//!
//! Each accepted socket gets a writer task that drains the connection's
//! outbound queue into the WebSocket sink, while the accepting task reads
//! frames and hands them to the hub. Neither side ever waits on another
//! connection.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::connection::{ConnectionId, Outbound};
use crate::error::{Error, Result};
use crate::hub::RelayHub;
use crate::server::config::ServerConfig;

/// How long the writer may keep flushing after the reader has finished
const WRITER_GRACE: Duration = Duration::from_secs(1);

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Upgrade `socket` and serve it until the client goes away
pub async fn run(
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: &ServerConfig,
    hub: &RelayHub,
) -> Result<()> {
    let ws = tokio::time::timeout(
        config.connection_timeout,
        tokio_tungstenite::accept_async(socket),
    )
    .await
    .map_err(|_| Error::HandshakeTimeout)??;

    let (conn, outbound) = hub.connect().await;
    tracing::info!(conn = %conn, peer = %peer_addr, "Client connected");

    let (sink, mut stream) = ws.split();
    let mut writer = tokio::spawn(write_loop(conn, sink, outbound));

    let result = read_loop(conn, &mut stream, config.idle_timeout, hub).await;

    hub.disconnect(conn).await;
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(conn = %conn, peer = %peer_addr, "Client disconnected");
    result
}

async fn read_loop(
    conn: ConnectionId,
    stream: &mut WsStream,
    idle_timeout: Duration,
    hub: &RelayHub,
) -> Result<()> {
    loop {
        let message = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Err(_) => {
                tracing::debug!(conn = %conn, "Idle timeout");
                return Ok(());
            }
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => hub.handle_text(conn, text.as_str()).await,
            Message::Binary(data) => hub.handle_chunk(conn, data).await,
            Message::Close(_) => return Ok(()),
            // Ping/pong is answered by tungstenite
            _ => {}
        }
    }
}

async fn write_loop(conn: ConnectionId, mut sink: WsSink, mut outbound: mpsc::Receiver<Outbound>) {
    while let Some(item) = outbound.recv().await {
        let message = match item {
            Outbound::Event(event) => match event.to_json() {
                Ok(json) => Message::text(json),
                Err(e) => {
                    tracing::warn!(conn = %conn, error = %e, "Failed to encode event");
                    continue;
                }
            },
            Outbound::Chunk(data) => Message::Binary(data),
            Outbound::Close => break,
        };

        if let Err(e) = sink.send(message).await {
            tracing::debug!(conn = %conn, error = %e, "Write failed");
            return;
        }
    }

    let _ = sink.close().await;
}
