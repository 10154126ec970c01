//! Panovault transfer engine.
//!
//! Implements the **business logic** for backing up 360° photos from the
//! publishing service into a destination store. It is a library crate with
//! no transport dependencies — the server crate bridges trigger messages
//! to the orchestrators here.
//!
//! # Pipeline
//!
//! 1. **Resolve** — find or create the well-known backup folder
//! 2. **Index** — list existing destination filenames once (idempotent resume)
//! 3. **Transfer** — per photo: download, embed pose metadata, upload
//! 4. **Report** — every mutation flows through the progress store to the
//!    live WebSocket client
//!
//! Execution is strictly sequential: one photo finishes before the next
//! starts, and cancellation is observed only at photo boundaries.

pub mod batch;
pub mod clients;
pub mod embed;
pub mod error;
pub mod fs;
pub mod http;
pub mod progress;
pub mod store;
pub mod transfer;

pub use batch::{BACKUP_FOLDER_NAME, BatchRunner, BatchSummary};
pub use clients::{CatalogLister, ClientFuture, DestinationStore, PercentFn, SourceDownloader};
pub use embed::{EMBED_ATTEMPTS, ExifCodec, JpegExifCodec, embed_with_retry};
pub use error::{EmbedError, TransferError};
pub use fs::LocalFolderStore;
pub use http::{HttpCatalog, HttpDownloader};
pub use progress::{GlobalPatch, ItemPatch, ProgressSink, ProgressUpdate};
pub use store::{ITEM_EXPIRY, ProgressSnapshot, ProgressStore};
