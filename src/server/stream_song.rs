//! Audio streaming functionality

use super::state::{GuardedCatalogueStore, ServerState};
use crate::catalogue_store::DownloadStatus;
use crate::download_manager::FileMaterializer;
use axum::{
    body::Body,
    extract::{FromRequestParts, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

const HEADER_BYTE_RANGE: &str = "Range";
const MISSING_FILE_MESSAGE: &str = "audio file missing on disk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start_inclusive: Option<u64>,
    end_inclusive: Option<u64>,
}

impl ByteRange {
    pub fn new(start_inclusive: Option<u64>, end_inclusive: Option<u64>) -> ByteRange {
        ByteRange {
            start_inclusive,
            end_inclusive,
        }
    }

    fn parse<S: AsRef<str>>(s: S) -> Option<ByteRange> {
        let v = s.as_ref().strip_prefix("bytes=")?;
        let parts: Vec<&str> = v.split('-').collect();
        if parts.len() != 2 {
            return None;
        }

        Some(ByteRange {
            start_inclusive: parts[0].parse::<u64>().ok(),
            end_inclusive: parts[1].parse::<u64>().ok(),
        })
    }

    /// The inclusive byte span this range selects in a file of `length`
    /// bytes. `None` if the range is unsatisfiable.
    fn resolve(&self, length: u64) -> Option<(u64, u64)> {
        let last = length.checked_sub(1)?;
        let (start, end) = match (self.start_inclusive, self.end_inclusive) {
            (None, None) => (0, last),
            (Some(start), None) => (start, last),
            (Some(start), Some(end)) => (start, end.min(last)),
            // suffix range: the final `n` bytes
            (None, Some(n)) => (length.saturating_sub(n), last),
        };
        (start <= end).then_some((start, end))
    }
}

pub struct ByteRangeExtractionError {}

impl IntoResponse for ByteRangeExtractionError {
    fn into_response(self) -> Response {
        StatusCode::BAD_REQUEST.into_response()
    }
}

impl FromRequestParts<ServerState> for Option<ByteRange> {
    type Rejection = ByteRangeExtractionError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .headers
            .get(HEADER_BYTE_RANGE)
            .and_then(|x| x.to_str().ok())
            .and_then(ByteRange::parse))
    }
}

fn content_type_for(file_path: &str) -> &'static str {
    match file_path.rsplit('.').next() {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("opus") => "audio/opus",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

pub async fn stream_song(
    byte_range: Option<ByteRange>,
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

    let file_path = match (&item.status, &item.file_path) {
        (DownloadStatus::Complete, Some(file_path)) => file_path.clone(),
        _ => {
            debug!("Song {} is not playable ({})", id, item.status);
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    let Some(path) = materializer.resolve(&file_path) else {
        warn!("Song {} has an invalid file path {}", id, file_path);
        return StatusCode::NOT_FOUND.into_response();
    };
    debug!("Streaming song {} from path {}", id, path.display());

    let mut file = match File::open(&path).await {
        Ok(x) => x,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Audio file for song {} is missing: {}", id, path.display());
            if let Err(e) = store.mark_failed(id, MISSING_FILE_MESSAGE) {
                error!("Failed to mark song {} as failed: {:#}", id, e);
            }
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let file_length = match file.metadata().await {
        Ok(x) => x.len(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let requested = byte_range.filter(|r| *r != ByteRange::new(None, None));
    let builder = Response::builder()
        .header("Content-Type", content_type_for(&file_path))
        .header("Accept-Ranges", "bytes");

    let response = match requested {
        None => {
            let file_reader = BufReader::with_capacity(4096 * 16, file);
            let stream = ReaderStream::with_capacity(file_reader, 4096 * 16);
            builder
                .status(StatusCode::OK)
                .header("Content-length", file_length)
                .body(Body::from_stream(stream))
        }
        Some(range) => {
            let Some((start, end)) = range.resolve(file_length) else {
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header("Content-Range", format!("bytes */{}", file_length))
                    .body(Body::empty())
                    .unwrap_or_else(|_| StatusCode::RANGE_NOT_SATISFIABLE.into_response());
            };
            if file.seek(SeekFrom::Start(start)).await.is_err() {
                return StatusCode::BAD_REQUEST.into_response();
            }
            let chunk_size = end - start + 1;
            let file_reader = BufReader::with_capacity(4096 * 16, file.take(chunk_size));
            let stream = ReaderStream::with_capacity(file_reader, 4096 * 16);
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    "Content-Range",
                    format!("bytes {}-{}/{}", start, end, file_length),
                )
                .header("Content-length", chunk_size)
                .body(Body::from_stream(stream))
        }
    };

    response.unwrap_or_else(|e| {
        error!("Failed to build stream response: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_byte_range(s: &str, a: Option<u64>, b: Option<u64>) {
        assert_eq!(ByteRange::parse(s), Some(ByteRange::new(a, b)));
    }

    fn assert_no_byte_range(s: &str) {
        assert_eq!(ByteRange::parse(s), None);
    }

    #[test]
    fn parses_byte_range() {
        assert_no_byte_range("asd");
        assert_no_byte_range("bytes=");
        assert_byte_range("bytes=-", None, None);
        assert_byte_range("bytes=11-", Some(11), None);
        assert_byte_range("bytes=-111", None, Some(111));
        assert_byte_range("bytes=11-111", Some(11), Some(111));
    }

    #[test]
    fn resolves_ranges_against_file_length() {
        assert_eq!(ByteRange::new(Some(2), None).resolve(10), Some((2, 9)));
        assert_eq!(ByteRange::new(Some(2), Some(4)).resolve(10), Some((2, 4)));
        assert_eq!(ByteRange::new(Some(2), Some(400)).resolve(10), Some((2, 9)));
        assert_eq!(ByteRange::new(None, Some(3)).resolve(10), Some((7, 9)));
        assert_eq!(ByteRange::new(None, Some(30)).resolve(10), Some((0, 9)));
        assert_eq!(ByteRange::new(Some(10), None).resolve(10), None);
        assert_eq!(ByteRange::new(Some(5), Some(2)).resolve(10), None);
        assert_eq!(ByteRange::new(Some(0), None).resolve(0), None);
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("media/1.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("media/1.ogg"), "audio/ogg");
        assert_eq!(content_type_for("media/1"), "application/octet-stream");
    }
}
