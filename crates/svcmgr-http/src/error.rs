//! REST error responses
//!
//! Every failure is answered with `{"success": false, "message": ...}`.
//! Bad input maps to 400, a missing docker provider to 503, and anything
//! that failed on the host to 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use svcmgr_core::Error;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Map a service error. `context` prefixes host failures, e.g.
    /// `"Failed to start service"`.
    pub fn from_service(err: Error, context: &str) -> Self {
        match err {
            Error::UnsupportedType(ref t) => Self::bad_request(format!("Unsupported service type: {}", t)),
            Error::NotFound { .. }
            | Error::NotFoundInAnyManager(_)
            | Error::InvalidArgument(_) => Self::bad_request(err.to_string()),
            Error::ContainerRuntimeUnavailable => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Docker manager not available")
            }
            other => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{}: {}", context, other),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), message = %self.message, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), message = %self.message, "Request rejected");
        }
        let body = Json(json!({
            "success": false,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::UnsupportedType("launchd".into()), StatusCode::BAD_REQUEST),
            (Error::not_found("web", "docker"), StatusCode::BAD_REQUEST),
            (Error::NotFoundInAnyManager("web".into()), StatusCode::BAD_REQUEST),
            (Error::invalid_argument("image_name is required"), StatusCode::BAD_REQUEST),
            (Error::ContainerRuntimeUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (Error::command_failed("systemctl start web", "denied"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from_service(err, "Failed").status, status);
        }
    }

    #[test]
    fn test_messages() {
        let err = ApiError::from_service(Error::UnsupportedType("launchd".into()), "ignored");
        assert_eq!(err.message, "Unsupported service type: launchd");

        let err = ApiError::from_service(
            Error::command_failed("systemctl start web", "denied"),
            "Failed to start service",
        );
        assert_eq!(
            err.message,
            "Failed to start service: command `systemctl start web` failed: denied"
        );
    }
}
