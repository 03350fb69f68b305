use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use validator::Validate;

use crate::api::errors::{ApiError, Surface};
use crate::core::state::AppState;
use crate::schemas::tutor::{TutorRequest, TutorResponse};

pub(crate) async fn math_tutor(
    State(state): State<AppState>,
    payload: Result<Json<TutorRequest>, JsonRejection>,
) -> Result<Json<TutorResponse>, ApiError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let tutor_response = state
        .tutor()
        .respond(&payload.transcription, &payload.chat_history, &payload.user_message)
        .await
        .map_err(|err| ApiError::upstream(Surface::Tutoring, err))?;

    Ok(Json(TutorResponse { tutor_response }))
}
