use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use validator::Validate;

use crate::api::errors::{ApiError, Surface};
use crate::core::state::AppState;
use crate::schemas::transcription::{TranscriptionRequest, TranscriptionResponse};
use crate::services::data_url::DataUrlImage;

pub(crate) async fn analyze_math(
    State(state): State<AppState>,
    payload: Result<Json<TranscriptionRequest>, JsonRejection>,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let service = state.transcription();
    let image = DataUrlImage::parse(&payload.image, service.max_image_bytes())?;

    let transcription = service
        .transcribe(&image)
        .await
        .map_err(|err| ApiError::upstream(Surface::ImageProcessing, err))?;

    Ok(Json(TranscriptionResponse { transcription }))
}
