//! Error types for the gateway crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mimic_core::CoreError;
use mimic_executor::SandboxError;
use serde_json::json;

/// Errors that end a request before a handler response can be rendered.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// No declared route matches the method and path.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// The request template did not render to valid JSON.
    #[error(transparent)]
    EventBuild(#[from] CoreError),

    /// The sandbox could not run or observe the invocation.
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// The request cannot be mapped at all.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Failure-taxonomy name reported in the response body.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "RouteNotFound",
            Self::EventBuild(e) => e.kind(),
            Self::Sandbox(_) => "SandboxError",
            Self::InvalidRequest(_) => "InvalidRequest",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::EventBuild(_) | Self::Sandbox(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "request failed");
        }
        (status, Json(json!({ "message": self.to_string(), "kind": self.kind() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_status_codes_map_correctly() {
        let not_found = GatewayError::RouteNotFound {
            method: "GET".to_owned(),
            path: "/nope".to_owned(),
        };
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let bad_req = GatewayError::InvalidRequest("body is not UTF-8".to_owned());
        assert_eq!(bad_req.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn gateway_error_sandbox_variant_returns_500() {
        let err = GatewayError::Sandbox(SandboxError::SpawnFailed("runtime died".to_owned()));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "Sandbox errors must map to 500"
        );
    }

    #[test]
    fn event_build_keeps_core_kind() {
        let err = GatewayError::from(CoreError::EventBuild {
            reason: "expected value".to_owned(),
            rendered: "{".to_owned(),
        });
        assert_eq!(err.kind(), "EventBuildError");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn gateway_error_display_includes_message() {
        let err = GatewayError::InvalidRequest("bad header".to_owned());
        assert!(err.to_string().contains("bad header"), "Display must include the message");
    }
}
