use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

/// The `{success, data|error, message?}` envelope every API response uses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }
}

pub(crate) fn reply<T: Serialize>(status: StatusCode, body: ApiResponse<T>) -> Response {
    (status, Json(body)).into_response()
}

pub(crate) fn err_response(status: StatusCode, error: impl Into<String>) -> Response {
    reply(status, ApiResponse::error(error))
}

pub(crate) fn missing_field(field: &str) -> Response {
    err_response(
        StatusCode::BAD_REQUEST,
        format!("Missing required field: {field}"),
    )
}

pub(crate) fn storage_error(error: anyhow::Error) -> Response {
    error!(?error, "Record store failure");
    err_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Storage error: {error}"),
    )
}

/// Unwraps a JSON body, answering malformed input with a 400 envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| err_response(StatusCode::BAD_REQUEST, rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_omits_empty_fields() {
        let value = serde_json::to_value(ApiResponse::data(json!({"id": 1}))).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"id": 1}}));

        let value = serde_json::to_value(ApiResponse::error("Stream not found")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "Stream not found"}));

        let value = serde_json::to_value(ApiResponse::message("deleted")).unwrap();
        assert_eq!(value, json!({"success": true, "message": "deleted"}));
    }

    #[test]
    fn test_with_message() {
        let value =
            serde_json::to_value(ApiResponse::data(3).with_message("created")).unwrap();
        assert_eq!(value, json!({"success": true, "data": 3, "message": "created"}));
    }
}
