use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::Json;

use crate::adapters::http::error::ApiError;
use crate::adapters::http::state::HttpState;
use crate::application::dto::PredictResponse;

/// Form field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

pub async fn predict(
    State(st): State<HttpState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    // A body that is not multipart has no files, same as a form without `image`.
    let Ok(multipart) = multipart else {
        return Err(ApiError::MissingImage);
    };

    let bytes = read_image_field(multipart).await?;
    let summary = st.prediction.predict(bytes).await?;
    Ok(Json(summary.into()))
}

async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        // Only file parts count; a plain text field named `image` is not an upload.
        if field.name() == Some(IMAGE_FIELD) && field.file_name().is_some() {
            let data = field.bytes().await?;
            return Ok(data.to_vec());
        }
    }
    Err(ApiError::MissingImage)
}
