use crate::AppState;
use crate::api::response::{
    ApiResponse, err_response, json_body, missing_field, reply, storage_error,
};
use crate::store::{Overlay, OverlayFields, StreamSetting, StreamSettingFields};
use crate::stream::is_rtsp_url;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path as AxumPath};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const INVALID_RTSP_URL: &str = "Invalid RTSP URL format. URL must start with rtsp://";
const STREAM_NOT_FOUND: &str = "Stream not found";
const OVERLAY_NOT_FOUND: &str = "Overlay not found";

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub rtsp_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub is_valid: bool,
    pub message: String,
}

//
// Stream settings
//

pub async fn list_streams(Extension(state): Extension<AppState>) -> Response {
    let streams = state.stream_settings.list().await;
    reply(StatusCode::OK, ApiResponse::data(streams))
}

pub async fn get_stream(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
) -> Response {
    match state.stream_settings.get(id).await {
        Some(stream) => reply(StatusCode::OK, ApiResponse::data(stream)),
        None => err_response(StatusCode::NOT_FOUND, STREAM_NOT_FOUND),
    }
}

pub async fn create_stream(
    Extension(state): Extension<AppState>,
    payload: Result<Json<StreamSettingFields>, JsonRejection>,
) -> Response {
    let fields = match json_body(payload) {
        Ok(fields) => fields,
        Err(response) => return response,
    };

    let Some(rtsp_url) = fields.rtsp_url else {
        return missing_field("rtsp_url");
    };
    let Some(stream_name) = fields.stream_name else {
        return missing_field("stream_name");
    };
    if !is_rtsp_url(&rtsp_url) {
        return err_response(StatusCode::BAD_REQUEST, INVALID_RTSP_URL);
    }

    let setting = StreamSetting::new(
        rtsp_url,
        stream_name,
        fields.is_active.unwrap_or(true),
        Utc::now(),
    );
    match state.stream_settings.insert(setting).await {
        Ok(stream) => {
            info!(id = stream.id, name = %stream.stream_name, "Stream setting created");
            reply(
                StatusCode::CREATED,
                ApiResponse::data(stream).with_message("Stream setting created successfully"),
            )
        }
        Err(error) => storage_error(error),
    }
}

pub async fn update_stream(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
    payload: Result<Json<StreamSettingFields>, JsonRejection>,
) -> Response {
    let fields = match json_body(payload) {
        Ok(fields) => fields,
        Err(response) => return response,
    };

    if let Some(rtsp_url) = &fields.rtsp_url
        && !is_rtsp_url(rtsp_url)
    {
        return err_response(StatusCode::BAD_REQUEST, INVALID_RTSP_URL);
    }

    let now = Utc::now();
    match state
        .stream_settings
        .update(id, |stream| stream.apply(fields, now))
        .await
    {
        Ok(Some(stream)) => reply(
            StatusCode::OK,
            ApiResponse::data(stream).with_message("Stream setting updated successfully"),
        ),
        Ok(None) => err_response(StatusCode::NOT_FOUND, STREAM_NOT_FOUND),
        Err(error) => storage_error(error),
    }
}

pub async fn delete_stream(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
) -> Response {
    match state.stream_settings.remove(id).await {
        Ok(true) => {
            info!(id, "Stream setting deleted");
            reply(
                StatusCode::OK,
                ApiResponse::message("Stream setting deleted successfully"),
            )
        }
        Ok(false) => err_response(StatusCode::NOT_FOUND, STREAM_NOT_FOUND),
        Err(error) => storage_error(error),
    }
}

/// Format-only check of an RTSP URL; nothing is contacted.
pub async fn validate_stream(payload: Result<Json<ValidateRequest>, JsonRejection>) -> Response {
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let Some(rtsp_url) = request.rtsp_url else {
        return err_response(StatusCode::BAD_REQUEST, "Missing rtsp_url field");
    };

    let is_valid = is_rtsp_url(&rtsp_url);
    let message = if is_valid {
        "RTSP URL is valid"
    } else {
        "RTSP URL format is invalid"
    };
    validation_reply(is_valid, message)
}

/// Asks ffprobe whether the source can actually be read.
pub async fn probe_stream(
    Extension(state): Extension<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let Some(rtsp_url) = request.rtsp_url else {
        return err_response(StatusCode::BAD_REQUEST, "Missing rtsp_url field");
    };

    let is_valid = state.supervisor.validate(&rtsp_url).await;
    debug!(%rtsp_url, is_valid, "Stream probed");
    let message = if is_valid {
        "RTSP stream is reachable"
    } else {
        "RTSP stream is not reachable"
    };
    validation_reply(is_valid, message)
}

fn validation_reply(is_valid: bool, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(ValidateResponse {
            success: true,
            is_valid,
            message: message.to_string(),
        }),
    )
        .into_response()
}

//
// Overlays
//

pub async fn list_overlays(Extension(state): Extension<AppState>) -> Response {
    let overlays = state.overlays.list().await;
    reply(StatusCode::OK, ApiResponse::data(overlays))
}

pub async fn get_overlay(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
) -> Response {
    match state.overlays.get(id).await {
        Some(overlay) => reply(StatusCode::OK, ApiResponse::data(overlay)),
        None => err_response(StatusCode::NOT_FOUND, OVERLAY_NOT_FOUND),
    }
}

pub async fn create_overlay(
    Extension(state): Extension<AppState>,
    payload: Result<Json<OverlayFields>, JsonRejection>,
) -> Response {
    let mut fields = match json_body(payload) {
        Ok(fields) => fields,
        Err(response) => return response,
    };

    let Some(name) = fields.name.take() else {
        return missing_field("name");
    };
    let kind = match fields.parse_kind() {
        Ok(Some(kind)) => kind,
        Ok(None) => return missing_field("type"),
        Err(error) => return err_response(StatusCode::BAD_REQUEST, error),
    };

    let now = Utc::now();
    let mut overlay = Overlay::new(name, kind, now);
    overlay.apply(fields, None, now);

    match state.overlays.insert(overlay).await {
        Ok(overlay) => {
            info!(id = overlay.id, name = %overlay.name, kind = %overlay.kind, "Overlay created");
            reply(
                StatusCode::CREATED,
                ApiResponse::data(overlay).with_message("Overlay created successfully"),
            )
        }
        Err(error) => storage_error(error),
    }
}

pub async fn update_overlay(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
    payload: Result<Json<OverlayFields>, JsonRejection>,
) -> Response {
    let fields = match json_body(payload) {
        Ok(fields) => fields,
        Err(response) => return response,
    };
    let kind = match fields.parse_kind() {
        Ok(kind) => kind,
        Err(error) => return err_response(StatusCode::BAD_REQUEST, error),
    };

    let now = Utc::now();
    match state
        .overlays
        .update(id, |overlay| overlay.apply(fields, kind, now))
        .await
    {
        Ok(Some(overlay)) => reply(
            StatusCode::OK,
            ApiResponse::data(overlay).with_message("Overlay updated successfully"),
        ),
        Ok(None) => err_response(StatusCode::NOT_FOUND, OVERLAY_NOT_FOUND),
        Err(error) => storage_error(error),
    }
}

pub async fn delete_overlay(
    Extension(state): Extension<AppState>,
    AxumPath(id): AxumPath<u64>,
) -> Response {
    match state.overlays.remove(id).await {
        Ok(true) => {
            info!(id, "Overlay deleted");
            reply(StatusCode::OK, ApiResponse::message("Overlay deleted successfully"))
        }
        Ok(false) => err_response(StatusCode::NOT_FOUND, OVERLAY_NOT_FOUND),
        Err(error) => storage_error(error),
    }
}
