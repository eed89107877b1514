//! Common test infrastructure
//!
//! Builds an isolated library (temp root, SQLite file, coordinator) wired to
//! a fake `yt-dlp` shell script, so end-to-end tests exercise the real
//! process adapter without network access.

use musichub_server::catalogue_store::SqliteCatalogueStore;
use musichub_server::config::DownloadSettings;
use musichub_server::download_manager::{
    DownloadCoordinator, FileMaterializer, SingleFlightLock, YtDlp,
};
use musichub_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Behaviour is selected by substrings of the URL:
/// - `unsupported`: metadata lookup fails
/// - `slow`: metadata lookup hangs
/// - `broken`: fetch fails with a 403
/// - `silent`: fetch succeeds without producing a file
/// - `m4a`: fetch produces an .m4a file
const FAKE_YTDLP_SCRIPT: &str = r#"#!/bin/sh
url="$1"
shift
case " $* " in
  *" --dump-json "*)
    case "$url" in
      *unsupported*) echo "ERROR: Unsupported URL: $url" >&2; exit 1 ;;
      *slow*) sleep 30 ;;
    esac
    printf '{"title": "Fake Song", "uploader": "Fake Channel", "duration": 61.4, "thumbnail": "https://img/fake.jpg"}\n'
    exit 0
    ;;
esac
template=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then template="$2"; fi
  shift
done
case "$url" in
  *broken*) echo "WARNING: retrying" >&2; echo "ERROR: HTTP Error 403: Forbidden" >&2; exit 1 ;;
  *silent*) exit 0 ;;
  *m4a*) ext=m4a ;;
  *) ext=mp3 ;;
esac
out=$(printf '%s' "$template" | sed "s/%(ext)s/$ext/")
printf 'audio' > "$out"
"#;

/// Writes the fake extraction tool into `dir` and returns its path.
pub fn install_fake_ytdlp(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-yt-dlp");
    std::fs::write(&path, FAKE_YTDLP_SCRIPT).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A library rooted in a temp directory.
pub struct TestLibrary {
    pub root: TempDir,
    pub ytdlp_path: PathBuf,
    pub store: Arc<SqliteCatalogueStore>,
    pub materializer: FileMaterializer,
    pub coordinator: Arc<DownloadCoordinator>,
}

impl TestLibrary {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("media")).unwrap();
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        let ytdlp_path = install_fake_ytdlp(root.path());

        let store = Arc::new(Self::open_store(root.path()));
        let settings = DownloadSettings {
            ytdlp_path: ytdlp_path.to_string_lossy().into_owned(),
            metadata_timeout_sec: 10,
            ..Default::default()
        };
        let ytdlp = Arc::new(YtDlp::new(&settings.ytdlp_path, settings.metadata_timeout()));
        let materializer = FileMaterializer::new(
            root.path(),
            "media",
            settings.preferred_codec.extension(),
        );
        let coordinator = Arc::new(DownloadCoordinator::new(
            store.clone(),
            ytdlp.clone(),
            ytdlp,
            materializer.clone(),
            Arc::new(SingleFlightLock::new()),
            &settings,
        ));

        Self {
            root,
            ytdlp_path,
            store,
            materializer,
            coordinator,
        }
    }

    pub fn open_store(root: &Path) -> SqliteCatalogueStore {
        SqliteCatalogueStore::new(root.join("data").join("musichub.db")).unwrap()
    }

    /// The HTTP app serving this library.
    pub fn app(&self) -> axum::Router {
        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        make_app(ServerState::new(
            config,
            self.store.clone(),
            self.coordinator.clone(),
            self.materializer.clone(),
        ))
    }

    /// A second adapter on the same script with a short metadata timeout.
    pub fn impatient_ytdlp(&self, timeout: Duration) -> YtDlp {
        YtDlp::new(&self.ytdlp_path, Some(timeout))
    }
}
