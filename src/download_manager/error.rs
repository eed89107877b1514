//! Download failure taxonomy.

use thiserror::Error;

/// Errors that can occur while admitting or executing a download.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("URL must not be empty")]
    InvalidUrl,

    #[error("metadata resolution failed: {0}")]
    MetadataResolution(String),

    #[error("download failed: {0}")]
    Fetch(String),

    #[error("output file not found after download: {0}")]
    OutputNotFound(String),

    #[error("catalogue update failed: {0}")]
    Persistence(String),

    #[error("catalogue item {0} no longer exists")]
    ItemVanished(i64),
}

impl From<anyhow::Error> for DownloadError {
    fn from(e: anyhow::Error) -> Self {
        DownloadError::Persistence(format!("{:#}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn anyhow_errors_become_persistence_failures_with_context_chain() {
        let source: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err: DownloadError = source.context("saving item").unwrap_err().into();
        assert_eq!(
            err,
            DownloadError::Persistence("saving item: disk full".to_string())
        );
    }

    #[test]
    fn messages_name_the_failure_kind() {
        assert_eq!(
            DownloadError::Fetch("HTTP Error 403".to_string()).to_string(),
            "download failed: HTTP Error 403"
        );
        assert!(DownloadError::OutputNotFound("media/1.mp3".to_string())
            .to_string()
            .starts_with("output file not found after download"));
    }
}
