use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{GlobalProgress, ItemProgress, Photo};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Client identification sent right after connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHello {
    pub name: String,
    pub version: String,
}

/// Starts a batch transfer.
///
/// `photos` is the ordered list of photos still missing from the destination;
/// the counts describe the full catalog so the engine can weight
/// `totalProgress` across already-backed-up photos too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchRequest {
    pub photos: Vec<Photo>,
    pub downloaded_count: u32,
    pub missing_count: u32,
}

/// Requests an ad-hoc transfer of a single photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPhotoRequest {
    pub photo_id: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Generic accepted/rejected reply to a trigger message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl OperationResult {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            detail: String::new(),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            accepted: false,
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// One progress store mutation, pushed to the live client.
///
/// `Snapshot` is sent once when a client (re)attaches mid-batch so its local
/// mirror starts from current state instead of an idle default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Global {
        record: GlobalProgress,
    },
    #[serde(rename_all = "camelCase")]
    Item {
        photo_id: String,
        record: ItemProgress,
    },
    Snapshot {
        global: GlobalProgress,
        items: HashMap<String, ItemProgress>,
    },
}
