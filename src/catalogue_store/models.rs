//! Catalogue data models.
//!
//! A catalogue item is one song: either fetched from a remote source by the
//! download manager, or uploaded directly (in which case it has no external
//! source and is complete from the start).

use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "Unknown Title";
pub const DEFAULT_ARTIST: &str = "Unknown Artist";

/// Maximum length (in characters) of a persisted error message.
pub const ERROR_MESSAGE_MAX_LEN: usize = 255;

/// Download status of a catalogue item.
///
/// `Pending -> Downloading -> Complete`, with `Error` reachable from any
/// non-terminal state. An item in `Error` (or `Pending`) may be re-admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Complete,
    Error,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DownloadStatus::Pending),
            "downloading" => Some(DownloadStatus::Downloading),
            "complete" => Some(DownloadStatus::Complete),
            "error" => Some(DownloadStatus::Error),
            _ => None,
        }
    }

    /// Returns true if a job is running for this item or it is already done,
    /// i.e. a new admission for it must be a no-op.
    pub fn is_busy_or_done(&self) -> bool {
        matches!(self, DownloadStatus::Downloading | DownloadStatus::Complete)
    }

    /// Statuses reported by the status polling endpoint.
    pub fn active() -> &'static [DownloadStatus] {
        &[DownloadStatus::Pending, DownloadStatus::Downloading]
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted catalogue item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogueItem {
    /// Store-assigned identifier, also used to name the audio file
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    #[serde(rename = "duration")]
    pub duration_seconds: Option<i64>,
    /// Origin URL; absent for direct uploads
    #[serde(rename = "original_url")]
    pub external_source: Option<String>,
    /// Path of the audio file relative to the library root
    pub file_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub status: DownloadStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for a new catalogue item. The id is assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCatalogueItem {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: Option<i64>,
    pub external_source: Option<String>,
    pub file_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub status: DownloadStatus,
}

impl NewCatalogueItem {
    /// A pending item for a remote source, with default display metadata.
    pub fn pending(external_source: impl Into<String>) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            artist: DEFAULT_ARTIST.to_string(),
            album: None,
            duration_seconds: None,
            external_source: Some(external_source.into()),
            file_path: None,
            thumbnail_url: None,
            status: DownloadStatus::Pending,
        }
    }
}

/// Truncates `message` to at most `max_chars` characters.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((byte_index, _)) => message[..byte_index].to_string(),
        None => message.to_string(),
    }
}
