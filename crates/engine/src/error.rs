//! Engine error types.

/// Errors from the pose metadata embedder.
///
/// Only `Transient` is retried; everything else propagates to the caller
/// immediately.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("transient codec failure: {0}")]
    Transient(String),

    #[error("unsupported image container: {0}")]
    Unsupported(String),

    #[error("EXIF write failed: {0}")]
    Write(String),
}

/// Errors produced while transferring photos.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("download failed: {0}")]
    Download(String),

    #[error("destination store error: {0}")]
    Destination(String),

    #[error("metadata embed failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("photo not found: {0}")]
    NotFound(String),

    #[error("cancelled")]
    Cancelled,
}
