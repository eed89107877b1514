//! Song catalogue HTTP routes.
//!
//! Provides endpoints for:
//! - Queueing a download from a source URL
//! - Listing the catalogue and the downloads in flight
//! - Deleting a song together with its audio file

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::catalogue_store::DownloadStatus;
use crate::download_manager::{Admission, DownloadError, FileMaterializer};
use crate::server::state::{GuardedCatalogueStore, GuardedCoordinator, ServerState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AddSongBody {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
        .into_response()
}

fn download_error_status(error: &DownloadError) -> StatusCode {
    match error {
        DownloadError::InvalidUrl => StatusCode::BAD_REQUEST,
        DownloadError::MetadataResolution(_) => StatusCode::BAD_GATEWAY,
        DownloadError::Fetch(_)
        | DownloadError::OutputNotFound(_)
        | DownloadError::Persistence(_)
        | DownloadError::ItemVanished(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /add - Admit a URL and download it in the background
async fn add_song(
    State(coordinator): State<GuardedCoordinator>,
    Json(body): Json<AddSongBody>,
) -> Response {
    debug!("Download requested for {}", body.url);

    match coordinator.spawn_download(&body.url).await {
        Ok(ticket) => match ticket.admission {
            Admission::Queued(item) => (StatusCode::ACCEPTED, Json(item)).into_response(),
            Admission::Existing(item) => (StatusCode::OK, Json(item)).into_response(),
        },
        Err(e) => {
            let status = download_error_status(&e);
            if status.is_server_error() {
                warn!("Could not queue {}: {}", body.url, e);
            }
            error_response(status, e.to_string())
        }
    }
}

/// GET /songs - Every song, ordered by artist then title
async fn list_songs(State(store): State<GuardedCatalogueStore>) -> Response {
    match store.list_items() {
        Ok(items) => Json(items).into_response(),
        Err(e) => {
            error!("Failed to list songs: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list songs")
        }
    }
}

/// GET /songs/status - Songs that are pending or downloading
async fn songs_status(State(coordinator): State<GuardedCoordinator>) -> Response {
    match coordinator.list_active() {
        Ok(items) => Json(items).into_response(),
        Err(e) => {
            error!("Failed to list active downloads: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// DELETE /songs/{id} - Remove a song and its audio file. Refused while the
/// song is downloading; the row is kept if the file cannot be removed.
async fn delete_song(
    State(store): State<GuardedCatalogueStore>,
    State(materializer): State<FileMaterializer>,
    Path(id): Path<i64>,
) -> Response {
    let item = match store.get_item(id) {
        Ok(Some(item)) => item,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to load song {}: {:#}", id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The running job would write its file after the row is gone
    if item.status == DownloadStatus::Downloading {
        return error_response(
            StatusCode::CONFLICT,
            format!("Song {} is still downloading", id),
        );
    }

    if let Some(file_path) = &item.file_path {
        if let Err(e) = materializer.remove(file_path).await {
            error!("Failed to delete audio file {} of song {}: {}", file_path, id, e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete audio file",
            );
        }
    }

    match store.delete_item(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to delete song {}: {:#}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// Router Construction
// =============================================================================

/// Build the song routes.
///
/// - POST /add
/// - GET /songs
/// - GET /songs/status
/// - DELETE /songs/{id}
/// - GET /stream/{id}
pub fn song_routes() -> Router<ServerState> {
    Router::new()
        .route("/add", post(add_song))
        .route("/songs", get(list_songs))
        .route("/songs/status", get(songs_status))
        .route("/songs/{id}", delete(delete_song))
        .route("/stream/{id}", get(super::stream_song::stream_song))
}
