use axum::extract::multipart::MultipartError;
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use tracing::{error, warn};

use crate::application::dto::ErrorResponse;
use crate::domain::errors::DomainError;

pub const MISSING_IMAGE: &str = "No image file uploaded";

#[derive(Debug)]
pub enum ApiError {
    /// No `image` part in the request (or no multipart body at all).
    MissingImage,
    /// The multipart stream itself could not be read (malformed, too large).
    BadUpload(StatusCode, String),
    Domain(DomainError),
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Domain(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadUpload(e.status(), e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingImage => (StatusCode::BAD_REQUEST, MISSING_IMAGE.to_string()),
            ApiError::BadUpload(status, msg) => {
                warn!("Rejected upload ({}): {}", status, msg);
                (status, msg)
            }
            ApiError::Domain(e @ DomainError::InvalidInput(_)) => {
                warn!("Invalid prediction input: {}", e);
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Domain(e) => {
                error!("Prediction failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
