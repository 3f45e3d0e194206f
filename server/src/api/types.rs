//! Shared API types
//!
//! The non-streaming endpoints all answer with the same envelope:
//! `{"code": "ok" | "invalid.params" | "notfound" | "error.server",
//!   "message": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::data::topics::BrokerError;

pub const CODE_OK: &str = "ok";
pub const CODE_INVALID_PARAMS: &str = "invalid.params";
pub const CODE_NOT_FOUND: &str = "notfound";
pub const CODE_SERVER_ERROR: &str = "error.server";

/// Response envelope for non-streaming endpoints
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: &'static str,
    pub message: String,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            code: CODE_OK,
            message: String::new(),
        }
    }
}

/// Broker error carried to an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BrokerError::InvalidParams(_) | BrokerError::SubscriberExists(_) => {
                (StatusCode::BAD_REQUEST, CODE_INVALID_PARAMS)
            }
            BrokerError::TopicNotFound(_) => (StatusCode::NOT_FOUND, CODE_NOT_FOUND),
            _ => {
                tracing::error!(error = %self.0, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_SERVER_ERROR)
            }
        };
        (
            status,
            Json(Envelope {
                code,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_shape() {
        let json = serde_json::to_value(Envelope::ok()).unwrap();
        assert_eq!(json["code"], "ok");
        assert_eq!(json["message"], "");
    }

    #[test]
    fn test_error_status_mapping() {
        let resp = ApiError(BrokerError::TopicNotFound("t".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ApiError(BrokerError::InvalidParams("bad".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError(BrokerError::SubscriberExists("s".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError(BrokerError::Internal("boom".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
