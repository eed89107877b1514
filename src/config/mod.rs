mod file_config;

pub use file_config::{DownloadConfig, FileConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MUSIC_DIRECTORY: &str = "media";
pub const DEFAULT_DATA_DIRECTORY: &str = "data";
pub const DATABASE_FILE_NAME: &str = "musichub.db";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub root_dir: PathBuf,
    pub music_directory: Option<PathBuf>,
    pub data_directory: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub preferred_codec: Option<AudioCodec>,
    pub preferred_quality: Option<String>,
    pub ytdlp_path: Option<String>,
    pub metadata_timeout_sec: Option<u64>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            music_directory: None,
            data_directory: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            logging_level: RequestsLoggingLevel::default(),
            frontend_dir_path: None,
            preferred_codec: None,
            preferred_quality: None,
            ytdlp_path: None,
            metadata_timeout_sec: None,
        }
    }
}

/// Audio formats the extraction tool can transcode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AudioCodec {
    #[default]
    Mp3,
    M4a,
    Opus,
    Vorbis,
    Flac,
    Wav,
}

impl AudioCodec {
    /// Name passed to `--audio-format`.
    pub fn ytdlp_format(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::M4a => "m4a",
            AudioCodec::Opus => "opus",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Flac => "flac",
            AudioCodec::Wav => "wav",
        }
    }

    /// Extension of the produced file.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioCodec::Vorbis => "ogg",
            other => other.ytdlp_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub preferred_codec: AudioCodec,
    pub preferred_quality: String,
    pub ytdlp_path: String,
    /// 0 disables the timeout
    pub metadata_timeout_sec: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            preferred_codec: AudioCodec::Mp3,
            preferred_quality: "0".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            metadata_timeout_sec: 60,
        }
    }
}

impl DownloadSettings {
    pub fn metadata_timeout(&self) -> Option<Duration> {
        match self.metadata_timeout_sec {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub root_dir: PathBuf,
    /// Relative to `root_dir`
    pub music_directory: PathBuf,
    pub data_directory: PathBuf,
    pub host: String,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    pub download: DownloadSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let root_dir = file
            .root_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.root_dir.clone());
        if !root_dir.exists() {
            bail!("Root directory does not exist: {:?}", root_dir);
        }
        if !root_dir.is_dir() {
            bail!("root_dir is not a directory: {:?}", root_dir);
        }

        let music_directory = file
            .music_directory
            .map(PathBuf::from)
            .or_else(|| cli.music_directory.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MUSIC_DIRECTORY));
        if !is_plain_relative(&music_directory) {
            bail!(
                "music_directory must be a relative path inside the root directory, got {:?}",
                music_directory
            );
        }

        let data_directory = file
            .data_directory
            .map(PathBuf::from)
            .or_else(|| cli.data_directory.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIRECTORY));

        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        // Download settings - merge file config with CLI and defaults
        let dl_file = file.download.unwrap_or_default();
        let defaults = DownloadSettings::default();
        let preferred_codec = match dl_file.preferred_codec {
            Some(name) => match parse_codec(&name) {
                Some(codec) => codec,
                None => bail!("Unsupported preferred_codec '{}'", name),
            },
            None => cli.preferred_codec.unwrap_or(defaults.preferred_codec),
        };
        let download = DownloadSettings {
            preferred_codec,
            preferred_quality: dl_file
                .preferred_quality
                .or_else(|| cli.preferred_quality.clone())
                .unwrap_or(defaults.preferred_quality),
            ytdlp_path: dl_file
                .ytdlp_path
                .or_else(|| cli.ytdlp_path.clone())
                .unwrap_or(defaults.ytdlp_path),
            metadata_timeout_sec: dl_file
                .metadata_timeout_sec
                .or(cli.metadata_timeout_sec)
                .unwrap_or(defaults.metadata_timeout_sec),
        };

        Ok(Self {
            root_dir,
            music_directory,
            data_directory,
            host,
            port,
            logging_level,
            frontend_dir_path,
            download,
        })
    }

    pub fn music_dir_path(&self) -> PathBuf {
        self.root_dir.join(&self.music_directory)
    }

    pub fn data_dir_path(&self) -> PathBuf {
        self.root_dir.join(&self.data_directory)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir_path().join(DATABASE_FILE_NAME)
    }
}

/// True for non-empty relative paths that never step outside their base.
fn is_plain_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

fn parse_codec(s: &str) -> Option<AudioCodec> {
    AudioCodec::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_for(dir: &TempDir) -> CliConfig {
        CliConfig {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_codec_names_and_extensions() {
        assert_eq!(parse_codec("MP3"), Some(AudioCodec::Mp3));
        assert_eq!(parse_codec("vorbis"), Some(AudioCodec::Vorbis));
        assert_eq!(parse_codec("aac"), None);
        assert_eq!(AudioCodec::Vorbis.ytdlp_format(), "vorbis");
        assert_eq!(AudioCodec::Vorbis.extension(), "ogg");
        assert_eq!(AudioCodec::Flac.extension(), "flac");
    }

    #[test]
    fn test_resolve_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_for(&dir), None).unwrap();

        assert_eq!(config.music_directory, PathBuf::from("media"));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Path);
        assert_eq!(config.download, DownloadSettings::default());
        assert_eq!(
            config.download.metadata_timeout(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.music_dir_path(), dir.path().join("media"));
        assert_eq!(config.db_path(), dir.path().join("data").join("musichub.db"));
    }

    #[test]
    fn test_resolve_cli_only() {
        let dir = TempDir::new().unwrap();
        let cli = CliConfig {
            music_directory: Some(PathBuf::from("songs")),
            data_directory: Some(PathBuf::from("db")),
            host: "127.0.0.1".to_string(),
            port: 4000,
            logging_level: RequestsLoggingLevel::Headers,
            frontend_dir_path: Some("/frontend".to_string()),
            preferred_codec: Some(AudioCodec::Opus),
            preferred_quality: Some("5".to_string()),
            ytdlp_path: Some("/opt/yt-dlp".to_string()),
            metadata_timeout_sec: Some(0),
            ..cli_for(&dir)
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.music_dir_path(), dir.path().join("songs"));
        assert_eq!(config.db_path(), dir.path().join("db").join("musichub.db"));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert_eq!(config.frontend_dir_path, Some("/frontend".to_string()));
        assert_eq!(config.download.preferred_codec, AudioCodec::Opus);
        assert_eq!(config.download.preferred_quality, "5");
        assert_eq!(config.download.ytdlp_path, "/opt/yt-dlp");
        assert_eq!(config.download.metadata_timeout(), None);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let dir = TempDir::new().unwrap();
        let cli = CliConfig {
            port: 4000,
            preferred_codec: Some(AudioCodec::Opus),
            ytdlp_path: Some("/cli/yt-dlp".to_string()),
            ..cli_for(&dir)
        };
        let file_config = FileConfig {
            port: Some(5000),
            logging_level: Some("body".to_string()),
            download: Some(DownloadConfig {
                preferred_codec: Some("flac".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.download.preferred_codec, AudioCodec::Flac);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.download.ytdlp_path, "/cli/yt-dlp");
    }

    #[test]
    fn test_resolve_rejects_escaping_music_directory() {
        let dir = TempDir::new().unwrap();
        for bad in ["/var/media", "../media", "media/../..", ""] {
            let cli = CliConfig {
                music_directory: Some(PathBuf::from(bad)),
                ..cli_for(&dir)
            };
            let err = AppConfig::resolve(&cli, None).unwrap_err().to_string();
            assert!(err.contains("music_directory"), "{}: {}", bad, err);
        }
    }

    #[test]
    fn test_resolve_rejects_unknown_codec() {
        let dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            download: Some(DownloadConfig {
                preferred_codec: Some("aac".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli_for(&dir), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("Unsupported preferred_codec"));
    }

    #[test]
    fn test_resolve_nonexistent_root_error() {
        let cli = CliConfig {
            root_dir: PathBuf::from("/nonexistent/path/that/should/not/exist"),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_root_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            root_dir: temp_file.path().to_path_buf(),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }
}
