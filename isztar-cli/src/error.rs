//! HTTP error mapping for the facade

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use isztar_core::{CatalogError, UpstreamError};

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    /// Human-readable message
    pub error: String,

    /// Stable machine-readable code
    pub code: &'static str,

    /// Body the tariff service answered with, when it answered at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_body: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    upstream_body: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            upstream_body: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            // The caller sees the tariff service's own status
            UpstreamError::Status { status, url, body } => {
                let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                Self {
                    status: code,
                    code: "UPSTREAM_STATUS",
                    message: format!("upstream returned HTTP {status} for {url}"),
                    upstream_body: (!body.is_empty()).then_some(body),
                }
            }
            other => {
                let mut message = other.to_string();
                if let Some(source) = std::error::Error::source(&other) {
                    message.push_str(&format!(": {source}"));
                }
                Self::bad_gateway(message)
            }
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidParameter { .. } => Self::bad_request(err.to_string()),
            CatalogError::Upstream { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INDEX_BUILD_FAILED",
                err.render_chain(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("{} {}: {}", status.as_u16(), self.code(), self.message);
        }

        let body = ApiErrorBody {
            error: self.message,
            code: self.code,
            upstream_body: self.upstream_body,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_upstream_status_is_propagated() {
        let err = ApiError::from(UpstreamError::Status {
            status: 404,
            url: "http://tariff.test/measures".to_string(),
            body: "{\"message\":\"unknown code\"}".to_string(),
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "UPSTREAM_STATUS");
        assert_eq!(err.upstream_body.as_deref(), Some("{\"message\":\"unknown code\"}"));
    }

    #[test]
    fn test_nonsense_upstream_status_becomes_bad_gateway() {
        let err = ApiError::from(UpstreamError::Status {
            status: 42,
            url: "http://tariff.test/codes".to_string(),
            body: String::new(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.upstream_body.is_none());
    }

    #[test]
    fn test_invalid_parameter_is_bad_request() {
        let err = ApiError::from(CatalogError::InvalidParameter {
            name: "date",
            message: "expected YYYY-MM-DD, got 'x'".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "BAD_REQUEST");
    }
}
