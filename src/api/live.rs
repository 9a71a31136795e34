use crate::AppState;
use crate::api::response::{ApiResponse, err_response, json_body, missing_field, reply};
use crate::stream::{PLAYLIST_EXTENSION, StreamInfo, is_rtsp_url};
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path as AxumPath};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use mime_guess::from_path;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

/// An active stream as reported by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStream {
    pub id: String,
    #[serde(flatten)]
    pub info: StreamInfo,
    /// Where a player can fetch the playlist from this server.
    pub playlist_url: String,
}

impl LiveStream {
    pub fn new(id: String, info: StreamInfo) -> Self {
        let playlist_url = format!("/hls/{id}.{PLAYLIST_EXTENSION}");
        Self {
            id,
            info,
            playlist_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartLiveRequest {
    pub id: Option<String>,
    pub rtsp_url: Option<String>,
}

/// Stream identifiers become file names in the HLS directory. All-digit ids
/// are reserved for saved stream settings, which run under their record id.
fn is_valid_stream_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !id.chars().all(|c| c.is_ascii_digit())
}

async fn start_transcode(state: &AppState, id: &str, rtsp_url: &str) -> Response {
    match state
        .supervisor
        .try_start(id, rtsp_url, state.hls_dir())
        .await
    {
        Ok(info) => reply(
            StatusCode::CREATED,
            ApiResponse::data(LiveStream::new(id.to_string(), info)).with_message("Stream started"),
        ),
        Err(error) => {
            error!(id, rtsp_url, %error, "Failed to start stream");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

async fn stop_transcode(state: &AppState, id: &str) -> Response {
    match state.supervisor.try_stop(id).await {
        Ok(()) => reply(StatusCode::OK, ApiResponse::message("Stream stopped")),
        Err(error) => {
            error!(id, %error, "Failed to stop stream");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

pub async fn list_live(Extension(state): Extension<AppState>) -> Response {
    let streams = state
        .supervisor
        .list_active()
        .await
        .into_iter()
        .map(|(id, info)| LiveStream::new(id, info))
        .collect::<Vec<_>>();
    reply(StatusCode::OK, ApiResponse::data(streams))
}

pub async fn get_live(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    match state.supervisor.try_status(&id).await {
        Ok(info) => reply(StatusCode::OK, ApiResponse::data(LiveStream::new(id, info))),
        Err(error) => err_response(StatusCode::NOT_FOUND, error.to_string()),
    }
}

pub async fn start_live(
    Extension(state): Extension<AppState>,
    payload: Result<Json<StartLiveRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let Some(id) = request.id else {
        return missing_field("id");
    };
    let Some(rtsp_url) = request.rtsp_url else {
        return missing_field("rtsp_url");
    };
    if !is_valid_stream_id(&id) {
        return err_response(
            StatusCode::BAD_REQUEST,
            "Invalid stream id: use 1-128 letters, digits, '-' or '_', not only digits",
        );
    }
    if !is_rtsp_url(&rtsp_url) {
        return err_response(
            StatusCode::BAD_REQUEST,
            "Invalid RTSP URL format. URL must start with rtsp://",
        );
    }

    start_transcode(&state, &id, &rtsp_url).await
}

pub async fn stop_live(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    stop_transcode(&state, &id).await
}

/// Starts the live transcode of a saved stream setting, keyed by its id.
pub async fn start_stream_setting(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
) -> Response {
    let Some(setting) = state.stream_settings.get(id).await else {
        return err_response(StatusCode::NOT_FOUND, "Stream not found");
    };
    if !setting.is_active {
        return err_response(StatusCode::BAD_REQUEST, "Stream setting is inactive");
    }

    info!(id, name = %setting.stream_name, "Starting saved stream");
    start_transcode(&state, &id.to_string(), &setting.rtsp_url).await
}

pub async fn stop_stream_setting(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
) -> Response {
    stop_transcode(&state, &id.to_string()).await
}

fn is_safe_file_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
}

fn content_type(filename: &str) -> String {
    match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        _ => from_path(filename).first_or_octet_stream().to_string(),
    }
}

/// Playlists roll over every segment; segments never change once written.
fn cache_control(filename: &str) -> &'static str {
    if filename.ends_with(".m3u8") {
        "no-cache"
    } else {
        "public,max-age=60"
    }
}

/// Serves playlists and segments out of the HLS output directory.
pub async fn serve_hls(
    Extension(state): Extension<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> Response {
    if !is_safe_file_name(&filename) {
        warn!(%filename, "Invalid filename");
        return err_response(StatusCode::BAD_REQUEST, "Invalid filename");
    }

    let path = state.hls_dir().join(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(error) => {
            debug!(%filename, ?error, "HLS file not available");
            return err_response(StatusCode::NOT_FOUND, "File not found");
        }
    };
    let len = file.metadata().await.map(|m| m.len()).ok();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type(&filename))
        .header(header::CACHE_CONTROL, cache_control(&filename));
    if let Some(len) = len {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap_or_else(|error| {
            error!(%filename, ?error, "Failed to build HLS response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
