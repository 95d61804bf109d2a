use crate::engine::{ErrorClass, SettlementError};
use crate::service::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Block source unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Settlement(e) => AppError::Settlement(e),
            ServiceError::Chain(e) => AppError::Unavailable(e.to_string()),
            ServiceError::Config(e) => AppError::Config(e.to_string()),
            ServiceError::Repo(e) => AppError::Internal(e.to_string()),
        }
    }
}

fn settlement_status(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::StateConflict => StatusCode::CONFLICT,
        ErrorClass::AuthFailure => StatusCode::FORBIDDEN,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Settlement(err) = &self {
            let class = err.class();
            let body = Json(json!({
                "error": err.to_string(),
                "class": class,
            }));
            return (settlement_status(class), body).into_response();
        }

        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Settlement(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
