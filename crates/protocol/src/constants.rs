//! Message type constants and protocol limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum WebSocket message size (notifications and triggers are small;
/// photo bytes never travel over this socket).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Interval between server-sent WebSocket pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// How long to wait for a pong before declaring the client dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Error code: malformed or missing payload.
pub const ERR_BAD_REQUEST: i32 = 400;
/// Error code: referenced photo is not in the current catalog.
pub const ERR_NOT_FOUND: i32 = 404;
/// Error code: a batch is already running.
pub const ERR_BATCH_ACTIVE: i32 = 409;
/// Error code: handler not implemented.
pub const ERR_NOT_IMPLEMENTED: i32 = 501;

/// All message types carried in the envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Client announces itself after connecting.
    ClientHello,
    /// Start a batch transfer of the given photos.
    StartBatch,
    /// Cancel the running batch at the next photo boundary.
    CancelBatch,
    /// Transfer a single photo by id.
    DownloadPhoto,
    /// Outbound progress notification (global, item, or snapshot).
    Progress,
    /// Generic accepted/rejected reply to a trigger.
    OperationResult,
    Ping,
    Pong,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&MessageType::StartBatch).unwrap(),
            "\"start_batch\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::DownloadPhoto).unwrap(),
            "\"download_photo\""
        );
        let parsed: MessageType = serde_json::from_str("\"cancel_batch\"").unwrap();
        assert_eq!(parsed, MessageType::CancelBatch);
    }
}
