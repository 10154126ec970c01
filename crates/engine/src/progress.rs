//! Progress patches and the sink abstraction.
//!
//! Orchestrators and the transfer unit never mutate progress records
//! directly: they report partial updates through a [`ProgressSink`], and the
//! store merges them and pushes notifications. Tests substitute a recording
//! sink.

use panovault_protocol::types::{BatchStatus, GlobalProgress, ItemProgress};

/// Partial update to the global progress record.
///
/// `None` fields are left untouched by the merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalPatch {
    pub in_progress: Option<bool>,
    pub total: Option<u32>,
    pub current: Option<u32>,
    pub message: Option<String>,
    pub total_progress: Option<u8>,
    pub complete: Option<bool>,
    pub cancelled: Option<bool>,
    pub error: Option<String>,
    pub status: Option<BatchStatus>,
    pub downloaded_count: Option<u32>,
    pub not_downloaded_count: Option<u32>,
    pub total_photos_count: Option<u32>,
    pub folder_link: Option<String>,
}

impl GlobalPatch {
    /// Patch carrying only a status line.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Terminal patch: batch finished, whether cleanly or not.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            complete: Some(true),
            in_progress: Some(false),
            status: Some(BatchStatus::Idle),
            ..Default::default()
        }
    }

    /// Merges this patch into the global record.
    pub fn apply(self, global: &mut GlobalProgress) {
        if let Some(v) = self.in_progress {
            global.in_progress = v;
        }
        if let Some(v) = self.total {
            global.total = v;
        }
        if let Some(v) = self.current {
            global.current = v;
        }
        if let Some(v) = self.message {
            global.message = v;
        }
        if let Some(v) = self.total_progress {
            global.total_progress = v;
        }
        if let Some(v) = self.complete {
            global.complete = v;
        }
        if let Some(v) = self.cancelled {
            global.cancelled = v;
        }
        if let Some(v) = self.error {
            global.error = Some(v);
        }
        if let Some(v) = self.status {
            global.status = v;
        }
        if let Some(v) = self.downloaded_count {
            global.downloaded_count = v;
        }
        if let Some(v) = self.not_downloaded_count {
            global.not_downloaded_count = v;
        }
        if let Some(v) = self.total_photos_count {
            global.total_photos_count = v;
        }
        if let Some(v) = self.folder_link {
            global.folder_link = Some(v);
        }
    }
}

/// Partial update to one photo's progress record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub download_progress: Option<u8>,
    pub upload_progress: Option<u8>,
    pub upload_started: Option<bool>,
    pub complete: Option<bool>,
    pub error: Option<String>,
    pub drive_link: Option<String>,
}

impl ItemPatch {
    /// Merges this patch into the item record.
    pub fn apply(self, item: &mut ItemProgress) {
        if let Some(v) = self.download_progress {
            item.download_progress = Some(v);
        }
        if let Some(v) = self.upload_progress {
            item.upload_progress = Some(v);
        }
        if let Some(v) = self.upload_started {
            item.upload_started = v;
        }
        if let Some(v) = self.complete {
            item.complete = v;
        }
        if let Some(v) = self.error {
            item.error = Some(v);
        }
        if let Some(v) = self.drive_link {
            item.drive_link = Some(v);
        }
    }

    /// Returns `true` if applying this patch puts the record in a terminal
    /// state (completed or errored).
    pub fn is_terminal(&self) -> bool {
        self.complete == Some(true) || self.error.is_some()
    }
}

/// One progress store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    Global(GlobalPatch),
    Item { photo_id: String, patch: ItemPatch },
}

impl ProgressUpdate {
    pub fn item_download(photo_id: impl Into<String>, pct: u8) -> Self {
        Self::Item {
            photo_id: photo_id.into(),
            patch: ItemPatch {
                download_progress: Some(pct),
                ..Default::default()
            },
        }
    }

    pub fn item_upload(photo_id: impl Into<String>, pct: u8) -> Self {
        Self::Item {
            photo_id: photo_id.into(),
            patch: ItemPatch {
                upload_progress: Some(pct),
                ..Default::default()
            },
        }
    }

    pub fn item_upload_started(photo_id: impl Into<String>) -> Self {
        Self::Item {
            photo_id: photo_id.into(),
            patch: ItemPatch {
                upload_started: Some(true),
                ..Default::default()
            },
        }
    }

    pub fn item_complete(photo_id: impl Into<String>, drive_link: Option<String>) -> Self {
        Self::Item {
            photo_id: photo_id.into(),
            patch: ItemPatch {
                complete: Some(true),
                drive_link,
                ..Default::default()
            },
        }
    }

    pub fn item_error(photo_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Item {
            photo_id: photo_id.into(),
            patch: ItemPatch {
                error: Some(error.into()),
                ..Default::default()
            },
        }
    }
}

/// Sink for progress updates.
///
/// The progress store is the production implementation; reporting cannot
/// fail and never blocks.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}
