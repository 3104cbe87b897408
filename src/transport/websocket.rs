//! WebSocket transport
//!
//! Accepts TCP connections, upgrades them and runs one session per
//! connection. A session is two tasks:
//! - read loop: decode each frame as a submission, ingest it, then hand the
//!   original frame to the hub for broadcast
//! - write loop: drain the connection's outbound channel into the socket,
//!   sending a close frame once the hub closes the channel
//!
//! Whichever loop ends first unregisters the connection; the session waits
//! for the writer before returning.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::app::Context;
use crate::client::{Connection, ConnectionId};
use crate::pipeline::{MessageRecord, MessageSubmission};
use crate::utils::Result;

/// What the read loop did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Broadcast(MessageRecord),
    /// Not a valid submission; dropped.
    Malformed,
    /// The store rejected the record; not broadcast.
    NotPersisted(MessageRecord),
    /// Control frames (ping, pong, raw) carry no submission.
    Ignored,
}

pub async fn start_websocket_server(addr: &str, ctx: Context) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve_websocket(listener, ctx).await
}

/// Accept loop over an already bound listener.
pub async fn serve_websocket(listener: TcpListener, ctx: Context) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            match accept_connection(stream).await {
                Ok(ws_stream) => {
                    debug!(%peer, "new WebSocket connection established");
                    run_session(ws_stream, ctx).await;
                }
                Err(e) => warn!(%peer, error = %e, "WebSocket handshake error"),
            }
        });
    }
}

pub(crate) async fn accept_connection(stream: TcpStream) -> Result<WebSocketStream<TcpStream>> {
    Ok(accept_async(stream).await?)
}

pub async fn run_session<S>(ws_stream: WebSocketStream<S>, ctx: Context)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (connection, outbound) = Connection::new(ctx.settings.hub.send_buffer);
    let conn_id = connection.id.clone();

    if let Err(e) = ctx.hub.register(connection).await {
        error!(conn_id = %conn_id, error = %e, "failed to register client");
        return;
    }
    info!(conn_id = %conn_id, "client registered");

    let (ws_sender, ws_receiver) = ws_stream.split();
    let mut writer = tokio::spawn(write_loop(ws_sender, outbound, conn_id.clone()));

    tokio::select! {
        _ = read_loop(ws_receiver, &ctx, &conn_id) => {
            ctx.hub.unregister(&conn_id);
            let _ = (&mut writer).await;
        }
        _ = &mut writer => {
            ctx.hub.unregister(&conn_id);
        }
    }

    info!(conn_id = %conn_id, "client disconnected");
}

async fn read_loop<S>(
    mut ws_receiver: SplitStream<WebSocketStream<S>>,
    ctx: &Context,
    conn_id: &ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "error reading message from WebSocket");
                return;
            }
        };
        if frame.is_close() {
            return;
        }
        handle_frame(ctx, conn_id, frame).await;
    }
}

/// Ingests one inbound frame and, once the record is persisted, broadcasts
/// the frame exactly as it was received.
pub async fn handle_frame(ctx: &Context, conn_id: &ConnectionId, frame: WsMessage) -> FrameOutcome {
    let decoded = match &frame {
        WsMessage::Text(text) => MessageSubmission::from_slice(text.as_str().as_bytes()),
        WsMessage::Binary(bytes) => MessageSubmission::from_slice(bytes),
        _ => return FrameOutcome::Ignored,
    };

    let submission = match decoded {
        Ok(submission) => submission,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "invalid client message");
            return FrameOutcome::Malformed;
        }
    };

    let outcome = ctx.pipeline.ingest(submission).await;
    if !outcome.is_persisted() {
        return FrameOutcome::NotPersisted(outcome.record);
    }

    if let Err(e) = ctx.hub.broadcast(frame, Some(conn_id.clone())) {
        error!(conn_id = %conn_id, error = %e, "failed to broadcast message");
    }
    FrameOutcome::Broadcast(outcome.record)
}

pub(crate) async fn write_loop<S>(
    mut ws_sender: SplitSink<WebSocketStream<S>, WsMessage>,
    mut outbound: mpsc::Receiver<WsMessage>,
    conn_id: ConnectionId,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = ws_sender.send(msg).await {
            warn!(conn_id = %conn_id, error = %e, "error writing message");
            return;
        }
    }

    // the hub closed the channel
    if let Err(e) = ws_sender.send(WsMessage::Close(None)).await {
        debug!(conn_id = %conn_id, error = %e, "failed to send close frame");
    }
    debug!(conn_id = %conn_id, "send loop closed");
}
