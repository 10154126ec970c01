//! Per-photo transfer pipeline: download → embed pose → upload.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use panovault_protocol::types::{BatchStatus, Photo, StoredFile};

use crate::clients::{DestinationStore, PercentFn, SourceDownloader};
use crate::embed::{ExifCodec, embed_with_retry};
use crate::error::TransferError;
use crate::progress::{GlobalPatch, ProgressSink, ProgressUpdate};

/// MIME type for everything this engine moves.
pub const PHOTO_MIME: &str = "image/jpeg";

/// Transfers one photo into the destination folder.
///
/// Owned by an orchestrator for the duration of one run; every phase reports
/// through the sink so the live client sees download and upload percentages
/// as they happen.
pub struct PhotoTransfer<'a> {
    source: &'a dyn SourceDownloader,
    dest: &'a dyn DestinationStore,
    codec: &'a dyn ExifCodec,
    cancel: CancellationToken,
}

impl<'a> PhotoTransfer<'a> {
    pub fn new(
        source: &'a dyn SourceDownloader,
        dest: &'a dyn DestinationStore,
        codec: &'a dyn ExifCodec,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            dest,
            codec,
            cancel,
        }
    }

    /// Runs the pipeline for one photo.
    ///
    /// Returns `Ok(None)` when cancellation was observed after the download
    /// phase — not transferred, not an error. Any failure propagates to the
    /// caller; the batch orchestrator decides whether it aborts the run.
    pub async fn transfer(
        &self,
        photo: &Photo,
        folder_id: &str,
        sink: &Arc<dyn ProgressSink>,
    ) -> Result<Option<StoredFile>, TransferError> {
        let file_name = photo.file_name();

        sink.report(ProgressUpdate::item_download(&photo.id, 0));
        sink.report(ProgressUpdate::Global(GlobalPatch {
            status: Some(BatchStatus::Downloading),
            message: Some(format!("Downloading {file_name}")),
            ..Default::default()
        }));

        let bytes = {
            let sink = Arc::clone(sink);
            let photo_id = photo.id.clone();
            let on_progress: PercentFn = Box::new(move |pct| {
                sink.report(ProgressUpdate::item_download(&photo_id, pct));
            });
            self.source.download(&photo.download_url, on_progress).await?
        };

        if self.cancel.is_cancelled() {
            debug!(photo = %photo.id, "cancelled after download, dropping bytes");
            sink.report(ProgressUpdate::Global(GlobalPatch::message(format!(
                "Transfer of {file_name} cancelled"
            ))));
            return Ok(None);
        }

        let bytes = match &photo.pose {
            Some(pose) => embed_with_retry(self.codec, bytes, pose, &photo.id, sink).await?,
            None => bytes,
        };

        let existing = self
            .dest
            .list_files(folder_id)
            .await?
            .into_iter()
            .find(|f| f.name == file_name);

        sink.report(ProgressUpdate::item_upload_started(&photo.id));
        sink.report(ProgressUpdate::Global(GlobalPatch {
            status: Some(BatchStatus::Uploading),
            message: Some(format!("Uploading {file_name}")),
            ..Default::default()
        }));

        let on_progress: PercentFn = {
            let sink = Arc::clone(sink);
            let photo_id = photo.id.clone();
            Box::new(move |pct| {
                sink.report(ProgressUpdate::item_upload(&photo_id, pct));
            })
        };

        let stored = match existing {
            // Overwrite in place so the file keeps its identity and link.
            Some(file) => {
                self.dest
                    .update_file(&file.id, PHOTO_MIME, bytes, on_progress)
                    .await?
            }
            None => {
                self.dest
                    .create_file(&file_name, PHOTO_MIME, bytes, folder_id, on_progress)
                    .await?
            }
        };

        Ok(Some(stored))
    }
}
