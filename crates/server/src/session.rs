//! Catalog bookkeeping for the connected client.
//!
//! Remembers which photos the client last reported as backed up versus
//! missing, so `download_photo` triggers can resolve a photo id without
//! another catalog round trip, and counts stay consistent across triggers.

use std::sync::Mutex;

use panovault_protocol::types::Photo;

#[derive(Default)]
struct SessionInner {
    downloaded: Vec<Photo>,
    missing: Vec<Photo>,
}

/// Per-process catalog session.
#[derive(Default)]
pub struct Session {
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the catalog split with what the client reported.
    pub fn set_catalog(&self, downloaded: Vec<Photo>, missing: Vec<Photo>) {
        let mut inner = self.inner.lock().unwrap();
        inner.downloaded = downloaded;
        inner.missing = missing;
    }

    /// Looks up a photo by id in either list.
    pub fn find(&self, photo_id: &str) -> Option<Photo> {
        let inner = self.inner.lock().unwrap();
        inner
            .missing
            .iter()
            .chain(inner.downloaded.iter())
            .find(|p| p.id == photo_id)
            .cloned()
    }

    /// Moves a photo from the missing list to the downloaded list.
    pub fn mark_downloaded(&self, photo_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.missing.iter().position(|p| p.id == photo_id) {
            let photo = inner.missing.remove(pos);
            inner.downloaded.push(photo);
        }
    }

    /// Current (downloaded, missing) counts.
    pub fn counts(&self) -> (u32, u32) {
        let inner = self.inner.lock().unwrap();
        (inner.downloaded.len() as u32, inner.missing.len() as u32)
    }

    /// Snapshot of the missing list, in catalog order.
    pub fn missing(&self) -> Vec<Photo> {
        self.inner.lock().unwrap().missing.clone()
    }

    /// Drops the cached catalog split.
    ///
    /// Called after every batch run; the split is stale once the engine has
    /// moved files, so the client must report a fresh listing.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.downloaded.clear();
        inner.missing.clear();
    }
}
