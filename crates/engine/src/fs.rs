//! Local-filesystem destination store.
//!
//! Backs the [`DestinationStore`] trait with a directory tree, mainly for
//! self-hosted setups and end-to-end testing without cloud credentials.
//! Folder and file ids are absolute paths; links use the `file://` scheme.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use panovault_protocol::types::{Folder, StoredFile};

use crate::clients::{ClientFuture, DestinationStore, PercentFn};
use crate::error::TransferError;

const WRITE_CHUNK: usize = 64 * 1024;

/// Destination store rooted at a local directory.
pub struct LocalFolderStore {
    root: PathBuf,
}

impl LocalFolderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_link(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    async fn ensure_folder(&self, name: &str) -> Result<Folder, TransferError> {
        let path = self.root.join(name);
        fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "destination folder ready");
        Ok(Folder {
            id: path.display().to_string(),
            link: Self::file_link(&path),
        })
    }

    async fn list(&self, folder_id: &str) -> Result<Vec<StoredFile>, TransferError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(folder_id).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            files.push(StoredFile {
                id: path.display().to_string(),
                name: entry.file_name().to_string_lossy().into_owned(),
                link: Self::file_link(&path),
            });
        }
        Ok(files)
    }

    async fn write_with_progress(
        path: &Path,
        bytes: &[u8],
        on_progress: PercentFn,
    ) -> Result<(), TransferError> {
        let mut file = fs::File::create(path).await?;
        let total = bytes.len();
        let mut written = 0usize;
        for chunk in bytes.chunks(WRITE_CHUNK) {
            file.write_all(chunk).await?;
            written += chunk.len();
            if total > 0 {
                on_progress(((written as f64 / total as f64) * 100.0) as u8);
            }
        }
        file.flush().await?;
        if total == 0 {
            on_progress(100);
        }
        Ok(())
    }
}

impl DestinationStore for LocalFolderStore {
    fn find_or_create_folder<'a>(&'a self, name: &'a str) -> ClientFuture<'a, Folder> {
        Box::pin(self.ensure_folder(name))
    }

    fn list_files<'a>(&'a self, folder_id: &'a str) -> ClientFuture<'a, Vec<StoredFile>> {
        Box::pin(self.list(folder_id))
    }

    fn create_file<'a>(
        &'a self,
        name: &'a str,
        _mime_type: &'a str,
        bytes: Vec<u8>,
        folder_id: &'a str,
        on_progress: PercentFn,
    ) -> ClientFuture<'a, StoredFile> {
        Box::pin(async move {
            let path = Path::new(folder_id).join(name);
            Self::write_with_progress(&path, &bytes, on_progress).await?;
            Ok(StoredFile {
                id: path.display().to_string(),
                name: name.to_string(),
                link: Self::file_link(&path),
            })
        })
    }

    fn update_file<'a>(
        &'a self,
        file_id: &'a str,
        _mime_type: &'a str,
        bytes: Vec<u8>,
        on_progress: PercentFn,
    ) -> ClientFuture<'a, StoredFile> {
        Box::pin(async move {
            let path = PathBuf::from(file_id);
            if !fs::try_exists(&path).await? {
                return Err(TransferError::NotFound(format!(
                    "no such file: {}",
                    path.display()
                )));
            }
            Self::write_with_progress(&path, &bytes, on_progress).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(StoredFile {
                id: file_id.to_string(),
                name,
                link: Self::file_link(&path),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::Arc;

    fn noop() -> PercentFn {
        Box::new(|_| {})
    }

    #[tokio::test]
    async fn folder_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());

        let first = store.find_or_create_folder("backup").await.unwrap();
        let second = store.find_or_create_folder("backup").await.unwrap();

        assert_eq!(first, second);
        assert!(Path::new(&first.id).is_dir());
    }

    #[tokio::test]
    async fn create_then_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());
        let folder = store.find_or_create_folder("backup").await.unwrap();

        store
            .create_file("a.jpg", "image/jpeg", vec![1, 2, 3], &folder.id, noop())
            .await
            .unwrap();

        let files = store.list_files(&folder.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.jpg");
        assert!(files[0].link.starts_with("file://"));
    }

    #[tokio::test]
    async fn update_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());
        let folder = store.find_or_create_folder("backup").await.unwrap();
        let created = store
            .create_file("a.jpg", "image/jpeg", vec![1, 2, 3], &folder.id, noop())
            .await
            .unwrap();

        let updated = store
            .update_file(&created.id, "image/jpeg", vec![9, 9], noop())
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.link, created.link);
        assert_eq!(fs::read(&created.id).await.unwrap(), vec![9, 9]);
    }

    #[tokio::test]
    async fn update_of_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());
        let missing = dir.path().join("ghost.jpg").display().to_string();

        let result = store.update_file(&missing, "image/jpeg", vec![1], noop()).await;
        assert!(matches!(result, Err(TransferError::NotFound(_))));
    }

    #[tokio::test]
    async fn write_progress_reaches_100() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());
        let folder = store.find_or_create_folder("backup").await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let on_progress: PercentFn = Box::new(move |pct| sink.lock().unwrap().push(pct));

        store
            .create_file(
                "big.jpg",
                "image/jpeg",
                vec![0u8; WRITE_CHUNK * 2 + 17],
                &folder.id,
                on_progress,
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen.last().unwrap(), 100);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn listing_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFolderStore::new(dir.path());
        let folder = store.find_or_create_folder("backup").await.unwrap();
        fs::create_dir(Path::new(&folder.id).join("nested"))
            .await
            .unwrap();
        store
            .create_file("a.jpg", "image/jpeg", vec![1], &folder.id, noop())
            .await
            .unwrap();

        let files = store.list_files(&folder.id).await.unwrap();
        assert_eq!(files.len(), 1);
    }
}
