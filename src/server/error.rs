use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::{CoreError, ErrorKind};

const LOG_TARGET: &str = "wager_chess::server::error";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation",
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let (status, code) = match (err.kind(), &err) {
            (ErrorKind::Validation, _) => (StatusCode::BAD_REQUEST, "validation"),
            (ErrorKind::NotFound, _) => (StatusCode::NOT_FOUND, "not_found"),
            (ErrorKind::Conflict, _) => (StatusCode::CONFLICT, "conflict"),
            (ErrorKind::Authorization, CoreError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            (ErrorKind::Authorization, _) => (StatusCode::FORBIDDEN, "forbidden"),
            (ErrorKind::Resource, CoreError::InsufficientFunds) => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient_funds")
            }
            (ErrorKind::Resource, _) => (StatusCode::FORBIDDEN, "inactive"),
            (ErrorKind::Infrastructure, _) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(target = LOG_TARGET, message = %self.message, "internal server error");
        }
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_by_category() {
        let cases = [
            (CoreError::validation("bad"), StatusCode::BAD_REQUEST),
            (CoreError::NotFound("game"), StatusCode::NOT_FOUND),
            (CoreError::AlreadyQueued, StatusCode::CONFLICT),
            (CoreError::Unauthorized, StatusCode::UNAUTHORIZED),
            (CoreError::Forbidden, StatusCode::FORBIDDEN),
            (CoreError::InsufficientFunds, StatusCode::PAYMENT_REQUIRED),
            (CoreError::storage("down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
