//! Extraction tool adapters.
//!
//! Both metadata resolution and content fetching are performed by one
//! external program (yt-dlp). The traits let the coordinator be driven by
//! fakes in tests.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::error::DownloadError;
use super::metadata::{ExtractedInfo, TrackMetadata};

/// Resolves display metadata for a source URL without downloading audio.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<TrackMetadata, DownloadError>;
}

/// Parameters of a single fetch invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Output path with an extension placeholder, e.g. `/lib/media/1.%(ext)s`
    pub output_template: String,
    /// Value for `--audio-format`
    pub audio_format: String,
    /// Value for `--audio-quality`
    pub audio_quality: String,
}

/// Downloads and transcodes audio for a source URL.
///
/// Success only means the tool reported success; whether the output file
/// exists is checked by the materializer.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<(), DownloadError>;
}

/// yt-dlp invoked as a child process.
#[derive(Debug, Clone)]
pub struct YtDlp {
    executable: PathBuf,
    metadata_timeout: Option<Duration>,
}

impl YtDlp {
    /// `metadata_timeout` of `None` waits indefinitely for metadata.
    pub fn new(executable: impl Into<PathBuf>, metadata_timeout: Option<Duration>) -> Self {
        Self {
            executable: executable.into(),
            metadata_timeout,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    pub fn metadata_args(url: &str) -> Vec<String> {
        [url, "--skip-download", "--dump-json", "--quiet"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn fetch_args(url: &str, request: &FetchRequest) -> Vec<String> {
        [
            url,
            "-f",
            "bestaudio/best",
            // single transcoding thread
            "--postprocessor-args",
            "ffmpeg:-threads 1",
            "--extract-audio",
            "--audio-format",
            request.audio_format.as_str(),
            "--audio-quality",
            request.audio_quality.as_str(),
            "-o",
            request.output_template.as_str(),
            "--quiet",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn parse_metadata(stdout: &[u8]) -> Result<TrackMetadata, String> {
        let text = String::from_utf8_lossy(stdout);
        let text = text.trim();
        if text.is_empty() {
            return Err("extraction tool returned no metadata".to_string());
        }
        let info: ExtractedInfo =
            serde_json::from_str(text).map_err(|e| format!("unparsable metadata: {}", e))?;
        Ok(info.into())
    }
}

/// The last non-empty stderr line, or the exit status when stderr is silent.
fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| format!("extraction tool exited with {}", output.status))
}

#[async_trait]
impl MetadataResolver for YtDlp {
    async fn resolve(&self, url: &str) -> Result<TrackMetadata, DownloadError> {
        debug!("Resolving metadata for {}", url);
        let mut command = self.command();
        command.args(Self::metadata_args(url));
        let output = command.output();
        let output = match self.metadata_timeout {
            Some(limit) => tokio::time::timeout(limit, output).await.map_err(|_| {
                DownloadError::MetadataResolution(format!(
                    "metadata resolution timed out after {}s",
                    limit.as_secs()
                ))
            })?,
            None => output.await,
        }
        .map_err(|e| {
            DownloadError::MetadataResolution(format!(
                "failed to run {}: {}",
                self.executable.display(),
                e
            ))
        })?;

        if !output.status.success() {
            return Err(DownloadError::MetadataResolution(failure_reason(&output)));
        }
        Self::parse_metadata(&output.stdout).map_err(DownloadError::MetadataResolution)
    }
}

#[async_trait]
impl ContentFetcher for YtDlp {
    async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<(), DownloadError> {
        debug!("Fetching {} into {}", url, request.output_template);
        let output = self
            .command()
            .args(Self::fetch_args(url, request))
            .output()
            .await
            .map_err(|e| {
                DownloadError::Fetch(format!(
                    "failed to run {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(DownloadError::Fetch(failure_reason(&output)));
        }
        Ok(())
    }
}
