//! HTTP error mapping for the control surface

use crate::error::GatewayError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use laud_common::api::ErrorResponse;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Errors returned by control endpoints
#[derive(Error, Debug)]
pub enum ApiError {
    /// No gateway session is connected under this label
    #[error("No gateway session for client '{0}'")]
    SessionNotFound(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Gateway(GatewayError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Gateway(GatewayError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::SessionNotFound(_) => "session_not_found",
            ApiError::Gateway(GatewayError::ChannelClosed(_)) => "channel_closed",
            ApiError::Gateway(GatewayError::SessionClosed) => "session_closed",
            ApiError::Gateway(GatewayError::Timeout { .. }) => "timeout",
            ApiError::Gateway(GatewayError::Encode(_)) => "encode_failed",
            ApiError::Gateway(GatewayError::Decode { .. }) => "decode_failed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::SessionNotFound(client) => ErrorResponse::with_details(
                self.code(),
                self.to_string(),
                json!({ "client": client }),
            ),
            ApiError::Gateway(_) => {
                warn!("Control request failed: {}", self);
                ErrorResponse::new(self.code(), self.to_string())
            }
        };

        (status, Json(body)).into_response()
    }
}
