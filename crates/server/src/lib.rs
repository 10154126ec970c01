//! WebSocket server for the panovault daemon.
//!
//! Accepts a single front-end client at a time, dispatches trigger messages
//! (start batch, cancel, single download) to a [`Handler`] trait, and feeds
//! live progress notifications back over the same socket.

mod connection;
mod engine;
mod handler;
mod server;
mod session;

pub use connection::{ClientConnection, ClientMeta, SendError, Sender};
pub use engine::EngineHandler;
pub use handler::{Handler, HandlerFuture};
pub use server::{ServerConfig, TransferServer};
pub use session::Session;

/// Send buffer capacity.
///
/// A batch emits a handful of notifications per photo; 1024 gives headroom
/// even for large catalogs without letting `try_send()` drop messages.
pub const SEND_BUFFER_SIZE: usize = 1024;

/// Errors produced by the transfer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("client already connected")]
    ClientAlreadyConnected,
}
