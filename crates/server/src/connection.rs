//! Client connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use panovault_protocol::constants::{
    MessageType, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};
use panovault_protocol::envelope::Message;
use panovault_protocol::messages::Notification;

use crate::SEND_BUFFER_SIZE;
use crate::handler::Handler;

/// Metadata about the connected client.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub name: String,
    pub version: String,
    pub remote_addr: String,
}

/// Handle for sending messages to the connected client.
///
/// Cloneable and cheap, wraps an `mpsc::Sender`.
#[derive(Clone)]
pub struct Sender {
    tx: mpsc::Sender<WsMessage>,
}

impl Sender {
    /// Creates a sender with its paired receive side.
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Sends a protocol [`Message`] as JSON text.
    ///
    /// Returns `Err` only if the buffer is full or the client disconnected.
    pub fn send_msg(&self, msg: Message) -> Result<(), SendError> {
        let json = serde_json::to_string(&msg).map_err(|_| SendError)?;
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!("send buffer full or closed, dropping message");
            SendError
        })
    }

    /// Sends a progress notification as a fresh `progress` message.
    pub fn send_notification(&self, notification: &Notification) -> Result<(), SendError> {
        let msg = Message::new(
            uuid::Uuid::new_v4().to_string(),
            MessageType::Progress,
            Some(notification),
        )
        .map_err(|_| SendError)?;
        self.send_msg(msg)
    }

    /// Sends an error response for the given request message.
    pub fn send_error(&self, req: &Message, code: i32, message: &str) -> Result<(), SendError> {
        self.send_msg(req.reply_error(code, message))
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Active connection to a client.
///
/// Owns the read/write pump tasks and provides a [`Sender`] for
/// asynchronous message delivery.
pub struct ClientConnection {
    pub meta: ClientMeta,
    sender: Sender,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Returns a cloneable [`Sender`] for this connection.
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Signals shutdown of the pumps.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Runs the read and write pumps for a WebSocket connection.
///
/// Returns the [`ClientConnection`] handle. The pumps run as background
/// tokio tasks and stop when the connection is closed or the cancel token
/// is triggered.
pub fn spawn_connection<S, H>(
    ws_stream: S,
    meta: ClientMeta,
    handler: Arc<H>,
    server_cancel: CancellationToken,
) -> ClientConnection
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (sender, rx) = Sender::channel(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();

    let conn = ClientConnection {
        meta: meta.clone(),
        sender: sender.clone(),
        cancel: cancel.clone(),
    };

    let (ws_sink, ws_stream) = ws_stream.split();

    let write_cancel = cancel.clone();
    tokio::spawn(write_pump(ws_sink, rx, write_cancel));

    let read_cancel = cancel.clone();
    let read_handler = handler.clone();
    let read_sender = sender.clone();
    tokio::spawn(async move {
        read_pump(ws_stream, read_sender, read_handler, read_cancel.clone()).await;
        // When the read pump exits, stop the write pump too.
        read_cancel.cancel();
        handler.on_client_disconnected().await;
        tracing::info!(client = %meta.name, "client disconnected");
    });

    conn
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Channel closed.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames and dispatches to the handler.
async fn read_pump<S, H>(mut stream: S, sender: Sender, handler: Arc<H>, cancel: CancellationToken)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    let mut pong_deadline = tokio::time::interval(WS_PONG_WAIT);
    pong_deadline.reset();
    let mut got_pong = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = pong_deadline.tick() => {
                if !got_pong {
                    tracing::warn!("pong timeout, closing connection");
                    break;
                }
                got_pong = false;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(ws_msg)) => {
                        match ws_msg {
                            WsMessage::Text(text) => {
                                if text.len() > WS_MAX_MESSAGE_SIZE {
                                    tracing::error!("message exceeds max size ({} > {})", text.len(), WS_MAX_MESSAGE_SIZE);
                                    continue;
                                }
                                dispatch_text(&handler, &sender, &text).await;
                            }
                            WsMessage::Binary(_) => {
                                // Photo bytes never travel over this socket.
                                tracing::warn!("unexpected binary frame, ignoring");
                            }
                            WsMessage::Pong(_) => {
                                got_pong = true;
                                pong_deadline.reset();
                            }
                            WsMessage::Ping(data) => {
                                let _ = sender.tx.try_send(WsMessage::Pong(data));
                            }
                            WsMessage::Close(_) => {
                                tracing::info!("received close frame");
                                break;
                            }
                            WsMessage::Frame(_) => {} // Raw frames ignored.
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("read pump error: {e}");
                        break;
                    }
                    None => break, // Stream ended.
                }
            }
        }
    }
}

/// Dispatches a text (JSON) message to the appropriate handler method.
async fn dispatch_text<H: Handler>(handler: &Arc<H>, sender: &Sender, text: &str) {
    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("invalid message JSON: {e}");
            return;
        }
    };

    let s = sender.clone();
    match msg.msg_type {
        MessageType::ClientHello => handler.on_client_hello(s, msg).await,
        MessageType::StartBatch => handler.on_start_batch(s, msg).await,
        MessageType::CancelBatch => handler.on_cancel_batch(s, msg).await,
        MessageType::DownloadPhoto => handler.on_download_photo(s, msg).await,
        MessageType::Ping => handler.on_ping(s, msg).await,
        _ => {
            tracing::warn!(msg_type = ?msg.msg_type, "unhandled message type");
            let _ = sender.send_error(
                &msg,
                panovault_protocol::constants::ERR_NOT_IMPLEMENTED,
                "unknown message type",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_error_display() {
        let err = SendError;
        assert!(err.to_string().contains("buffer full"));
    }

    #[test]
    fn client_meta_clone() {
        let meta = ClientMeta {
            name: "web-ui".into(),
            version: "1.0".into(),
            remote_addr: "127.0.0.1".into(),
        };
        let cloned = meta.clone();
        assert_eq!(meta.name, cloned.name);
    }
}
