//! Locating the audio file produced by a fetch and naming it for the catalogue.

use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

use super::error::DownloadError;

/// Container the extraction tool falls back to when it cannot produce the
/// requested extension directly.
const FALLBACK_EXTENSION: &str = "m4a";

/// Maps catalogue ids to audio files under `<root>/<music_dir>`.
///
/// Paths handed to the catalogue are relative to `root`, always use `/`
/// separators and never contain `..`.
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    root_dir: PathBuf,
    music_dir: PathBuf,
    extension: String,
}

impl FileMaterializer {
    /// `music_dir` must be relative to `root_dir`.
    pub fn new(
        root_dir: impl Into<PathBuf>,
        music_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            music_dir: music_dir.into(),
            extension: extension.into(),
        }
    }

    pub fn music_dir_path(&self) -> PathBuf {
        self.root_dir.join(&self.music_dir)
    }

    fn path_for(&self, id: i64, extension: &str) -> PathBuf {
        self.music_dir_path().join(format!("{}.{}", id, extension))
    }

    /// Where a completed download for `id` must end up.
    pub fn primary_path(&self, id: i64) -> PathBuf {
        self.path_for(id, &self.extension)
    }

    /// Output template for the extraction tool, leaving the extension to it.
    pub fn output_template(&self, id: i64) -> String {
        self.path_for(id, "%(ext)s").to_string_lossy().into_owned()
    }

    /// The catalogue path for `id`, e.g. `media/12.mp3`.
    pub fn stored_path(&self, id: i64) -> String {
        let mut parts: Vec<String> = self
            .music_dir
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        parts.push(format!("{}.{}", id, self.extension));
        parts.join("/")
    }

    /// Verifies the fetched file for `id` exists, renaming the fallback
    /// container onto the primary path if needed. Returns the path to persist.
    pub async fn materialize(&self, id: i64) -> Result<String, DownloadError> {
        let primary = self.primary_path(id);
        if file_exists(&primary).await {
            return Ok(self.stored_path(id));
        }

        if self.extension != FALLBACK_EXTENSION {
            let fallback = self.path_for(id, FALLBACK_EXTENSION);
            if file_exists(&fallback).await {
                warn!(
                    "Expected {:?} but found {:?}, renaming",
                    primary, fallback
                );
                tokio::fs::rename(&fallback, &primary).await.map_err(|e| {
                    DownloadError::OutputNotFound(format!(
                        "could not rename {} to {}: {}",
                        fallback.display(),
                        primary.display(),
                        e
                    ))
                })?;
                return Ok(self.stored_path(id));
            }
        }

        Err(DownloadError::OutputNotFound(self.stored_path(id)))
    }

    /// Absolute location of a stored catalogue path.
    ///
    /// Returns `None` for absolute paths or paths escaping the root.
    pub fn resolve(&self, stored: &str) -> Option<PathBuf> {
        let relative = Path::new(stored);
        let is_contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if stored.is_empty() || !is_contained {
            return None;
        }
        Some(self.root_dir.join(relative))
    }

    /// Deletes the file behind a stored catalogue path.
    /// Returns false if there was nothing to delete.
    pub async fn remove(&self, stored: &str) -> std::io::Result<bool> {
        let Some(path) = self.resolve(stored) else {
            warn!("Refusing to delete file outside the library: {}", stored);
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted audio file {:?}", path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
