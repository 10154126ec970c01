//! Collaborator interfaces the engine drives.
//!
//! These traits mirror the external services: the photo catalog, the source
//! image host, and the destination store. Using traits keeps the transfer
//! logic decoupled from transport and testable with mocks; concrete
//! implementations live in [`crate::http`] and [`crate::fs`].

use std::future::Future;
use std::pin::Pin;

use panovault_protocol::types::{Folder, Photo, StoredFile};

use crate::error::TransferError;

/// A boxed future returned by client trait methods.
pub type ClientFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Streaming progress callback, reporting 0–100 integer percentages.
pub type PercentFn = Box<dyn Fn(u8) + Send + Sync>;

/// Lists the user's photo catalog from the publishing service.
///
/// Pagination is internal; the engine only consumes the final materialized
/// list, in catalog order.
pub trait CatalogLister: Send + Sync {
    fn list_catalog<'a>(&'a self) -> ClientFuture<'a, Vec<Photo>>;
}

/// Downloads full-resolution image bytes from the source host.
///
/// Implementations hold whatever auth credentials the host requires.
pub trait SourceDownloader: Send + Sync {
    fn download<'a>(&'a self, url: &'a str, on_progress: PercentFn) -> ClientFuture<'a, Vec<u8>>;
}

/// File and folder operations on the destination store.
pub trait DestinationStore: Send + Sync {
    /// Returns the folder with the given name, creating it if absent.
    fn find_or_create_folder<'a>(&'a self, name: &'a str) -> ClientFuture<'a, Folder>;

    /// Lists all files directly inside a folder.
    fn list_files<'a>(&'a self, folder_id: &'a str) -> ClientFuture<'a, Vec<StoredFile>>;

    /// Creates a new file, streaming upload progress.
    fn create_file<'a>(
        &'a self,
        name: &'a str,
        mime_type: &'a str,
        bytes: Vec<u8>,
        folder_id: &'a str,
        on_progress: PercentFn,
    ) -> ClientFuture<'a, StoredFile>;

    /// Overwrites an existing file in place, preserving its identity and
    /// link, streaming upload progress.
    fn update_file<'a>(
        &'a self,
        file_id: &'a str,
        mime_type: &'a str,
        bytes: Vec<u8>,
        on_progress: PercentFn,
    ) -> ClientFuture<'a, StoredFile>;
}
