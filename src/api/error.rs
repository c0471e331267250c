// HTTP error body and the mapping from domain errors to status codes

use crate::error::LaundryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<LaundryError> for ApiError {
    fn from(err: LaundryError) -> Self {
        let (status, code) = match &err {
            // Existing clients expect 400 on a duplicate create
            LaundryError::Conflict(_) => (StatusCode::BAD_REQUEST, "conflict"),
            LaundryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            LaundryError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            LaundryError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
            LaundryError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            LaundryError::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "not_implemented"),
            LaundryError::BackendUnavailable(_) => {
                error!(error = %err, "storage backend failure");
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
            }
        };
        ApiError::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{MachineKey, MachineStatus};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (LaundryError::machine_exists(MachineKey::new(1, 0)), StatusCode::BAD_REQUEST),
            (LaundryError::machine_not_found(MachineKey::new(1, 0)), StatusCode::NOT_FOUND),
            (LaundryError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                LaundryError::InvalidTransition {
                    key: MachineKey::new(1, 0),
                    from: MachineStatus::Error,
                    to: MachineStatus::InUse,
                },
                StatusCode::CONFLICT,
            ),
            (LaundryError::NotImplemented("machine deletion"), StatusCode::NOT_IMPLEMENTED),
            (LaundryError::BackendUnavailable("disk".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
