//! Batch and single-photo orchestrators.
//!
//! The batch walks the missing-photo list in caller order, skips photos
//! whose deterministic filename already exists at the destination, drives
//! the transfer unit for the rest, and keeps the aggregate progress record
//! current after every photo. Cancellation is observed only between photos;
//! the photo in flight finishes (or fails) first.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use panovault_protocol::types::{Photo, StoredFile};

use crate::clients::{DestinationStore, SourceDownloader};
use crate::embed::ExifCodec;
use crate::error::TransferError;
use crate::progress::{GlobalPatch, ProgressSink, ProgressUpdate};
use crate::store::ProgressStore;
use crate::transfer::PhotoTransfer;

/// Well-known destination folder for all backed-up photos.
pub const BACKUP_FOLDER_NAME: &str = "360-photo-backup";

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Photos transferred by the transfer unit this run.
    pub transferred: u32,
    /// Photos skipped because their file already existed at the destination.
    pub already_present: u32,
    /// Photos that failed or were dropped by mid-item cancellation.
    pub skipped: u32,
    pub cancelled: bool,
    pub error: Option<String>,
}

/// Drives batch and single-photo transfers.
///
/// One instance lives for the process lifetime; only one batch may run at a
/// time (the server rejects triggers while `GlobalProgress.in_progress`).
pub struct BatchRunner {
    store: Arc<ProgressStore>,
    source: Arc<dyn SourceDownloader>,
    dest: Arc<dyn DestinationStore>,
    codec: Arc<dyn ExifCodec>,
    folder_name: String,
    /// Token for the batch currently running; replaced on every run so a
    /// cancelled batch does not poison the next one.
    cancel: Mutex<CancellationToken>,
}

impl BatchRunner {
    pub fn new(
        store: Arc<ProgressStore>,
        source: Arc<dyn SourceDownloader>,
        dest: Arc<dyn DestinationStore>,
        codec: Arc<dyn ExifCodec>,
    ) -> Self {
        Self {
            store,
            source,
            dest,
            codec,
            folder_name: BACKUP_FOLDER_NAME.to_string(),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Overrides the destination folder name.
    pub fn with_folder_name(mut self, name: impl Into<String>) -> Self {
        self.folder_name = name.into();
        self
    }

    /// Requests cancellation of the running batch.
    ///
    /// Takes effect at the next photo boundary; the photo in flight still
    /// completes or fails first.
    pub fn cancel(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();
        token
    }

    /// Runs a batch over `photos`, the ordered list still missing from the
    /// destination. `downloaded_count`/`missing_count` describe the full
    /// catalog so aggregate progress is weighted across photos that were
    /// already backed up in previous runs.
    ///
    /// Never returns an error: item-level failures skip that photo, and
    /// setup failures end the run in the `error` terminal state. Either way
    /// the global record leaves with `complete=true, inProgress=false`.
    pub async fn run_batch(
        &self,
        photos: Vec<Photo>,
        downloaded_count: u32,
        missing_count: u32,
    ) -> BatchSummary {
        let cancel = self.fresh_token();
        let summary = match self
            .run_inner(&photos, downloaded_count, missing_count, &cancel)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "batch failed");
                self.store.update(ProgressUpdate::Global(GlobalPatch {
                    error: Some(message.clone()),
                    ..GlobalPatch::terminal(format!("Backup failed: {message}"))
                }));
                BatchSummary {
                    error: Some(message),
                    ..Default::default()
                }
            }
        };
        self.close_dangling_items();
        summary
    }

    async fn run_inner(
        &self,
        photos: &[Photo],
        downloaded_count: u32,
        missing_count: u32,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, TransferError> {
        let folder = self.dest.find_or_create_folder(&self.folder_name).await?;
        self.store.update(ProgressUpdate::Global(GlobalPatch {
            folder_link: Some(folder.link.clone()),
            ..Default::default()
        }));

        // One upfront listing is the idempotent-resume mechanism: anything
        // already named `{id}.jpg` here is done, no re-download.
        let existing: HashSet<String> = self
            .dest
            .list_files(&folder.id)
            .await?
            .into_iter()
            .map(|f| f.name)
            .collect();

        let total_known = downloaded_count + missing_count;
        if missing_count as usize != photos.len() {
            warn!(
                missing_count,
                provided = photos.len(),
                "missing count does not match photo list"
            );
        }

        self.store.update(ProgressUpdate::Global(GlobalPatch {
            in_progress: Some(true),
            total: Some(photos.len() as u32),
            current: Some(0),
            message: Some("Starting backup".into()),
            total_progress: Some(ratio_pct(downloaded_count, total_known)),
            complete: Some(false),
            cancelled: Some(false),
            ..Default::default()
        }));

        info!(
            photos = photos.len(),
            already = downloaded_count,
            folder = %folder.id,
            "batch started"
        );

        let sink: Arc<dyn ProgressSink> = Arc::clone(&self.store) as Arc<dyn ProgressSink>;
        let unit = PhotoTransfer::new(&*self.source, &*self.dest, &*self.codec, cancel.clone());
        let mut summary = BatchSummary::default();

        for (i, photo) in photos.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(remaining = photos.len() - i, "batch cancelled");
                self.store.update(ProgressUpdate::Global(GlobalPatch {
                    cancelled: Some(true),
                    ..GlobalPatch::terminal("Cancelling...")
                }));
                summary.cancelled = true;
                return Ok(summary);
            }

            let file_name = photo.file_name();
            self.store.update(ProgressUpdate::Global(GlobalPatch {
                current: Some(i as u32),
                ..Default::default()
            }));

            if existing.contains(&file_name) {
                debug!(photo = %photo.id, "already at destination");
                self.store
                    .update(ProgressUpdate::Global(GlobalPatch::message(format!(
                        "Skipping existing file {file_name}"
                    ))));
                summary.already_present += 1;
            } else {
                match unit.transfer(photo, &folder.id, &sink).await {
                    Ok(Some(file)) => {
                        summary.transferred += 1;
                        self.store
                            .update(ProgressUpdate::item_complete(&photo.id, Some(file.link)));
                    }
                    Ok(None) => {
                        // Cancelled mid-photo; the loop head ends the batch.
                        summary.skipped += 1;
                    }
                    Err(e) => {
                        warn!(photo = %photo.id, error = %e, "transfer failed, continuing");
                        summary.skipped += 1;
                        self.store
                            .update(ProgressUpdate::item_error(&photo.id, e.to_string()));
                    }
                }
            }

            let done = downloaded_count + summary.transferred + summary.already_present;
            self.store.update(ProgressUpdate::Global(GlobalPatch {
                downloaded_count: Some(done),
                not_downloaded_count: Some(total_known.saturating_sub(done)),
                total_photos_count: Some(total_known),
                total_progress: Some(ratio_pct(downloaded_count + i as u32 + 1, total_known)),
                ..Default::default()
            }));
        }

        let message = if summary.skipped > 0 {
            format!("Backup complete ({} photos skipped)", summary.skipped)
        } else {
            "Backup complete".to_string()
        };
        self.store
            .update(ProgressUpdate::Global(GlobalPatch::terminal(message)));

        info!(
            transferred = summary.transferred,
            already_present = summary.already_present,
            skipped = summary.skipped,
            "batch finished"
        );
        Ok(summary)
    }

    /// Transfers one photo outside any batch.
    ///
    /// Runs with an independent token, so it neither observes nor affects
    /// batch cancellation, and never touches the global in-progress flags.
    pub async fn run_single(&self, photo: &Photo) -> Result<StoredFile, TransferError> {
        let sink: Arc<dyn ProgressSink> = Arc::clone(&self.store) as Arc<dyn ProgressSink>;

        let folder = match self.dest.find_or_create_folder(&self.folder_name).await {
            Ok(folder) => folder,
            Err(e) => {
                self.store
                    .update(ProgressUpdate::item_error(&photo.id, e.to_string()));
                return Err(e);
            }
        };

        let unit = PhotoTransfer::new(
            &*self.source,
            &*self.dest,
            &*self.codec,
            CancellationToken::new(),
        );
        match unit.transfer(photo, &folder.id, &sink).await {
            Ok(Some(file)) => {
                self.store.update(ProgressUpdate::item_complete(
                    &photo.id,
                    Some(file.link.clone()),
                ));
                info!(photo = %photo.id, "single transfer finished");
                Ok(file)
            }
            // The token above is never cancelled; treat a None defensively.
            Ok(None) => Err(TransferError::Cancelled),
            Err(e) => {
                warn!(photo = %photo.id, error = %e, "single transfer failed");
                self.store
                    .update(ProgressUpdate::item_error(&photo.id, e.to_string()));
                Err(e)
            }
        }
    }

    /// Marks any still-open item records terminal so they expire instead of
    /// lingering after the batch has ended.
    fn close_dangling_items(&self) {
        for (photo_id, record) in self.store.get().items {
            if !record.complete && record.error.is_none() {
                self.store.update(ProgressUpdate::item_complete(photo_id, None));
            }
        }
    }
}

fn ratio_pct(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (f64::from(done) / f64::from(total) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
