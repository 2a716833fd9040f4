//! HTTP API
//!
//! Administrative REST routes, the internal node-to-node routes and the
//! server that hosts both.

pub mod internal;
pub mod rest;
pub mod server;

pub use rest::RestRouter;
pub use server::{ApiServer, ApiServerConfig};

use crate::error::{Error, ErrorBody};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// HTTP status for an error
pub fn status_code(err: &Error) -> StatusCode {
    match err {
        Error::Conflict { .. } => StatusCode::CONFLICT,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidConfig(_)
        | Error::InvalidObject(_)
        | Error::TenantMismatch { .. }
        | Error::MissingTenantValue { .. }
        | Error::TenancyNotEnabled { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::JsonParse(_) => StatusCode::BAD_REQUEST,
        Error::ShardGone { .. } => StatusCode::GONE,
        Error::Routing { .. } => StatusCode::BAD_GATEWAY,
        Error::PartialClusterFailure { .. } | Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        Error::Internal(_) | Error::Configuration(_) | Error::YamlParse(_) | Error::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Error returned by handlers, rendered as an `ErrorBody`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code(&self.0);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, code = self.0.code(), "Request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(&Error::conflict("class", "A")), StatusCode::CONFLICT);
        assert_eq!(status_code(&Error::not_found("tenant", "t")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_code(&Error::MissingTenantValue {
                class: "A".into(),
                tenant_key: "k".into()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_code(&Error::routing("node-2", "timeout")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_code(&Error::PartialClusterFailure { nodes: vec![] }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
