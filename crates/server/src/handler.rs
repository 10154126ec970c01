//! Handler trait for processing trigger messages.
//!
//! Implementors provide the domain logic (batch start, cancel, single
//! download) while the server framework handles connection management and
//! routing.

use std::future::Future;
use std::pin::Pin;

use panovault_protocol::constants::ERR_NOT_IMPLEMENTED;
use panovault_protocol::envelope::Message;

use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling trigger messages from the connected client.
///
/// The server dispatches parsed messages to the appropriate method. Each
/// method receives:
/// - `sender`: channel to send replies and notifications back to the client
/// - `msg`: the parsed JSON envelope
///
/// Default implementations reply with "not implemented" so handlers only
/// need to override the message types they care about.
pub trait Handler: Send + Sync + 'static {
    /// Called when a client identifies itself (`client_hello`).
    /// The handler should bind the live notification feed to this sender.
    fn on_client_hello(&self, sender: Sender, msg: Message) -> HandlerFuture<'_>;

    /// Called for `start_batch`.
    fn on_start_batch(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `cancel_batch`.
    fn on_cancel_batch(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `download_photo`.
    fn on_download_photo(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender.send_error(&msg, ERR_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `ping` messages.
    fn on_ping(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Ok(reply) = msg.reply(panovault_protocol::MessageType::Pong, Option::<&()>::None)
            {
                let _ = sender.send_msg(reply);
            }
        })
    }

    /// Called when the client disconnects (cleanup hook).
    fn on_client_disconnected(&self) -> HandlerFuture<'_> {
        Box::pin(async {})
    }
}
