//! JSON response envelope shared by every route.
//!
//! All bodies have the shape `{"status": ..., "action"?: ..., "message"?: ...}`;
//! non-2xx responses always carry `status = "error"`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            action: None,
            message: None,
        }
    }

    pub fn ok_action(action: &str, message: &str) -> Self {
        Self {
            status: "ok".to_string(),
            action: Some(action.to_string()),
            message: Some(message.to_string()),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            action: None,
            message: Some(message.to_string()),
        }
    }
}

/// Build a non-2xx response with the structured error body.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(ApiResponse::error(message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_omits_empty_fields() {
        let body = serde_json::to_string(&ApiResponse::ok()).unwrap();
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[test]
    fn action_ack_has_all_fields() {
        let body =
            serde_json::to_string(&ApiResponse::ok_action("shutdown", "executing")).unwrap();
        assert_eq!(
            body,
            r#"{"status":"ok","action":"shutdown","message":"executing"}"#
        );
    }

    #[test]
    fn error_body_shape() {
        let body = serde_json::to_string(&ApiResponse::error("unauthorized")).unwrap();
        assert_eq!(body, r#"{"status":"error","message":"unauthorized"}"#);
    }
}
