use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import modules from the library crate
use musichub_server::catalogue_store::{CatalogueStore, SqliteCatalogueStore};
use musichub_server::config::{self, AudioCodec};
use musichub_server::download_manager::{
    DownloadCoordinator, FileMaterializer, SingleFlightLock, YtDlp,
};
use musichub_server::server::{run_server, RequestsLoggingLevel, ServerConfig, ServerState};

const INTERRUPTED_MESSAGE: &str = "interrupted by server restart";

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Library root. Music and data directories are resolved against it.
    #[clap(value_parser = parse_path, default_value = ".")]
    pub root_dir: PathBuf,

    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory for audio files, relative to the root [default: media]
    #[clap(long)]
    pub music_directory: Option<PathBuf>,

    /// Directory for the database, relative to the root [default: data]
    #[clap(long)]
    pub data_directory: Option<PathBuf>,

    /// The address to bind.
    #[clap(long, default_value = config::DEFAULT_HOST)]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = config::DEFAULT_PORT)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Audio format downloads are transcoded to [default: mp3]
    #[clap(long, value_enum)]
    pub preferred_codec: Option<AudioCodec>,

    /// Value passed to yt-dlp's --audio-quality [default: 0]
    #[clap(long)]
    pub preferred_quality: Option<String>,

    /// yt-dlp executable [default: yt-dlp]
    #[clap(long)]
    pub ytdlp_path: Option<String>,

    /// Timeout in seconds for metadata lookups. Set to 0 to disable [default: 60]
    #[clap(long)]
    pub metadata_timeout_sec: Option<u64>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            root_dir: args.root_dir.clone(),
            music_directory: args.music_directory.clone(),
            data_directory: args.data_directory.clone(),
            host: args.host.clone(),
            port: args.port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            preferred_codec: args.preferred_codec,
            preferred_quality: args.preferred_quality.clone(),
            ytdlp_path: args.ytdlp_path.clone(),
            metadata_timeout_sec: args.metadata_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  root_dir: {:?}", app_config.root_dir);
    info!("  music_directory: {:?}", app_config.music_directory);
    info!("  data_directory: {:?}", app_config.data_directory);
    info!(
        "  codec: {} (quality {})",
        app_config.download.preferred_codec.ytdlp_format(),
        app_config.download.preferred_quality
    );

    for dir in [app_config.music_dir_path(), app_config.data_dir_path()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }

    info!("Opening SQLite catalogue database at {:?}...", app_config.db_path());
    let catalogue_store = Arc::new(SqliteCatalogueStore::new(app_config.db_path())?);

    // Jobs do not survive a restart
    let interrupted = catalogue_store.fail_unfinished(INTERRUPTED_MESSAGE)?;
    if interrupted > 0 {
        warn!(
            "Marked {} unfinished download(s) as failed after restart",
            interrupted
        );
    }

    let download = &app_config.download;
    let ytdlp = Arc::new(YtDlp::new(&download.ytdlp_path, download.metadata_timeout()));
    let materializer = FileMaterializer::new(
        &app_config.root_dir,
        &app_config.music_directory,
        download.preferred_codec.extension(),
    );
    let coordinator = Arc::new(DownloadCoordinator::new(
        catalogue_store.clone(),
        ytdlp.clone(),
        ytdlp,
        materializer.clone(),
        Arc::new(SingleFlightLock::new()),
        download,
    ));

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        host: app_config.host.clone(),
        port: app_config.port,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
    };
    let state = ServerState::new(server_config, catalogue_store, coordinator, materializer);

    info!("Ready to serve at {}:{}!", app_config.host, app_config.port);
    run_server(state).await
}
