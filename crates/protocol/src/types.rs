use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Positional metadata captured with a 360° photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pose {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// One transferable 360° photo from the publishing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Stable identifier assigned by the publishing service.
    pub id: String,
    /// Source URL for the full-resolution image bytes.
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_count: u64,
}

impl Photo {
    /// Deterministic filename at the destination store.
    pub fn file_name(&self) -> String {
        format!("{}.jpg", self.id)
    }
}

/// A folder in the destination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub link: String,
}

/// A file in the destination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub link: String,
}

/// Phase of the batch currently in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Idle,
    Downloading,
    Uploading,
}

/// Aggregate progress for the whole backup run.
///
/// One instance lives for the process lifetime; orchestrators mutate it only
/// through the progress store, which pushes the full record on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalProgress {
    /// True from batch start until a terminal update.
    pub in_progress: bool,
    /// Number of photos in the currently processing subset.
    pub total: u32,
    /// 0-based cursor within that subset.
    pub current: u32,
    /// Latest human-readable status line.
    pub message: String,
    /// Weighted completion (0–100) across the entire catalog, already-backed-up
    /// photos included.
    pub total_progress: u8,
    pub complete: bool,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: BatchStatus,
    pub downloaded_count: u32,
    pub not_downloaded_count: u32,
    pub total_photos_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_link: Option<String>,
}

/// Progress for one photo currently mid-transfer.
///
/// Created lazily on the first update for that photo; deleted a few seconds
/// after `complete` flips true (the UI has rendered the terminal state by
/// then).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_progress: Option<u8>,
    pub upload_started: bool,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_file_name_is_deterministic() {
        let photo = Photo {
            id: "CAoSLEFGMVFpcE1C".into(),
            download_url: "https://example.com/p".into(),
            pose: None,
            capture_time: None,
            view_count: 0,
        };
        assert_eq!(photo.file_name(), "CAoSLEFGMVFpcE1C.jpg");
    }

    #[test]
    fn photo_json_roundtrip() {
        let photo = Photo {
            id: "p1".into(),
            download_url: "https://example.com/p1".into(),
            pose: Some(Pose {
                latitude: 48.8584,
                longitude: 2.2945,
                heading: Some(120.0),
                pitch: Some(2.5),
                roll: None,
                altitude: Some(35.0),
            }),
            capture_time: None,
            view_count: 42,
        };
        let json = serde_json::to_string(&photo).unwrap();
        let parsed: Photo = serde_json::from_str(&json).unwrap();
        assert_eq!(photo, parsed);
    }

    #[test]
    fn photo_field_names() {
        let json = r#"{"id":"a","downloadUrl":"u","viewCount":3}"#;
        let photo: Photo = serde_json::from_str(json).unwrap();
        assert_eq!(photo.view_count, 3);
        assert!(photo.pose.is_none());
    }

    #[test]
    fn global_progress_defaults_to_idle() {
        let g = GlobalProgress::default();
        assert!(!g.in_progress);
        assert!(!g.complete);
        assert_eq!(g.status, BatchStatus::Idle);
        assert_eq!(g.total_progress, 0);
    }

    #[test]
    fn global_progress_omits_empty_options() {
        let g = GlobalProgress::default();
        let json = serde_json::to_string(&g).unwrap();
        assert!(!json.contains("error"));
        assert!(!json.contains("folderLink"));
        assert!(json.contains("\"status\":\"idle\""));
    }

    #[test]
    fn item_progress_omits_unset_percentages() {
        let item = ItemProgress::default();
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("downloadProgress"));
        assert!(!json.contains("uploadProgress"));
        assert!(json.contains("uploadStarted"));
    }
}
