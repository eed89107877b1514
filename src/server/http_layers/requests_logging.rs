//! Request logging middleware

use super::super::state::ServerState;
use axum::extract::State;
use axum::{
    body::Body,
    http::{header::HeaderMap, Method, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

const MAX_LOGGABLE_BODY_LENGTH: usize = 1024;

fn content_length(headers: &HeaderMap) -> Result<usize, &'static str> {
    headers
        .get("content-length")
        .ok_or("Content-length not set.")?
        .to_str()
        .map_err(|_| "Could not get Content-length string value.")?
        .parse::<usize>()
        .map_err(|_| "Could not parse Content-length numeric value.")
}

/// Logs a small body and hands back an equivalent one. Bodies without a
/// usable length, or larger than the cap, pass through unread.
async fn log_body(label: &str, headers: &HeaderMap, body: Body) -> Result<Body, axum::Error> {
    match content_length(headers) {
        Err(reason) => {
            info!("  {} Body: {}", label, reason);
            Ok(body)
        }
        Ok(size) if size >= MAX_LOGGABLE_BODY_LENGTH => {
            info!(
                "  {} Body: Too big to log ({:#})",
                label,
                byte_unit::Byte::from(size)
            );
            Ok(body)
        }
        Ok(size) => {
            let bytes = axum::body::to_bytes(body, size).await?;
            info!("  {} Body:\n{}", label, String::from_utf8_lossy(&bytes));
            Ok(Body::from(bytes))
        }
    }
}

fn log_headers(label: &str, headers: &HeaderMap) {
    info!("  {} Headers:", label);
    for (name, value) in headers.iter() {
        info!("    {:?}: {:?}", name, value);
    }
}

/// The song a catalogue route acts on, e.g. `/api/stream/12` -> 12.
fn song_id(path: &str) -> Option<i64> {
    let rest = path
        .strip_prefix("/api/songs/")
        .or_else(|| path.strip_prefix("/api/stream/"))?;
    rest.parse().ok()
}

/// How an add request was admitted, read off its status code.
fn admission_outcome(method: &Method, path: &str, status: StatusCode) -> Option<&'static str> {
    if method != Method::POST || path != "/api/add" {
        return None;
    }
    Some(match status {
        StatusCode::ACCEPTED => "queued",
        StatusCode::OK => "already known",
        _ => "rejected",
    })
}

fn internal_error() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let level = state.config.requests_logging_level.clone();
    if level == RequestsLoggingLevel::None {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    info!(">>> {} {}", method, request.uri());

    let (parts, body) = request.into_parts();
    if level >= RequestsLoggingLevel::Headers {
        log_headers("Req", &parts.headers);
    }
    let body = if level >= RequestsLoggingLevel::Body {
        match log_body("Req", &parts.headers, body).await {
            Ok(body) => body,
            Err(err) => {
                error!("Failed to read request body: {:?}", err);
                return internal_error();
            }
        }
    } else {
        body
    };

    let response = next.run(Request::from_parts(parts, body)).await;

    let (parts, body) = response.into_parts();
    if level >= RequestsLoggingLevel::Headers {
        log_headers("Resp", &parts.headers);
    }
    let body = if level >= RequestsLoggingLevel::Body {
        match log_body("Resp", &parts.headers, body).await {
            Ok(body) => body,
            Err(err) => {
                error!("Failed to read response body: {:?}", err);
                return internal_error();
            }
        }
    } else {
        body
    };

    let mut detail = String::new();
    if let Some(id) = song_id(&path) {
        detail.push_str(&format!(" song={}", id));
    }
    if let Some(outcome) = admission_outcome(&method, &path, parts.status) {
        detail.push_str(&format!(" admission={}", outcome));
    }
    info!(
        "<<< {} {} {}{} ({}ms)",
        parts.status.as_u16(),
        method,
        path,
        detail,
        start.elapsed().as_millis()
    );

    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn level_ordering() {
        let none = RequestsLoggingLevel::None;

        assert!(none < RequestsLoggingLevel::Headers);
        assert!(RequestsLoggingLevel::Body > RequestsLoggingLevel::None);
        assert_eq!(RequestsLoggingLevel::default(), RequestsLoggingLevel::Path);
    }

    #[test]
    fn content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert!(content_length(&headers).is_err());

        headers.insert("content-length", HeaderValue::from_static("12"));
        assert_eq!(content_length(&headers), Ok(12));

        headers.insert("content-length", HeaderValue::from_static("twelve"));
        assert!(content_length(&headers).is_err());
    }

    #[test]
    fn song_id_is_read_from_catalogue_paths() {
        assert_eq!(song_id("/api/songs/12"), Some(12));
        assert_eq!(song_id("/api/stream/3"), Some(3));
        assert_eq!(song_id("/api/songs/status"), None);
        assert_eq!(song_id("/api/songs"), None);
        assert_eq!(song_id("/other/3"), None);
    }

    #[test]
    fn admission_outcome_only_for_add() {
        assert_eq!(
            admission_outcome(&Method::POST, "/api/add", StatusCode::ACCEPTED),
            Some("queued")
        );
        assert_eq!(
            admission_outcome(&Method::POST, "/api/add", StatusCode::OK),
            Some("already known")
        );
        assert_eq!(
            admission_outcome(&Method::POST, "/api/add", StatusCode::BAD_GATEWAY),
            Some("rejected")
        );
        assert_eq!(
            admission_outcome(&Method::GET, "/api/songs", StatusCode::OK),
            None
        );
    }

    #[tokio::test]
    async fn small_bodies_are_passed_through_intact() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from_static("5"));
        let body = log_body("Req", &headers, Body::from("hello")).await.unwrap();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }
}
