use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub root_dir: Option<String>,
    pub music_directory: Option<String>,
    pub data_directory: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,

    // Feature configs
    pub download: Option<DownloadConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    pub preferred_codec: Option<String>,
    pub preferred_quality: Option<String>,
    pub ytdlp_path: Option<String>,
    pub metadata_timeout_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_partial_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
port = 8080
music_directory = "songs"

[download]
preferred_codec = "opus"
metadata_timeout_sec = 0
"#,
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.music_directory.as_deref(), Some("songs"));
        assert!(config.host.is_none());
        let download = config.download.unwrap();
        assert_eq!(download.preferred_codec.as_deref(), Some("opus"));
        assert_eq!(download.metadata_timeout_sec, Some(0));
        assert!(download.ytdlp_path.is_none());
    }

    #[test]
    fn reports_unreadable_and_malformed_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(FileConfig::load(&missing)
            .unwrap_err()
            .to_string()
            .contains("Failed to read"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "port = \"not a number\"").unwrap();
        assert!(FileConfig::load(&broken)
            .unwrap_err()
            .to_string()
            .contains("Failed to parse"));
    }
}
