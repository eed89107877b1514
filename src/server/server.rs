use anyhow::{Context, Result};
use std::time::{Duration, Instant};

use tower_http::services::ServeDir;

use axum::{
    extract::State, middleware, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use tracing::info;

use super::{log_requests, song_routes::song_routes, state::*, ServerConfig};
use crate::download_manager::FileMaterializer;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
    })
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        catalogue_store: GuardedCatalogueStore,
        coordinator: GuardedCoordinator,
        materializer: FileMaterializer,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            catalogue_store,
            coordinator,
            materializer,
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    let api_routes: Router = song_routes().with_state(state.clone());

    let home_router: Router = match &state.config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(state: ServerState) -> Result<()> {
    let address = format!("{}:{}", state.config.host, state.config.port);
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on {}", address);

    Ok(axum::serve(listener, app).await?)
}
