use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct TranscriptionRequest {
    /// Data URL produced by the browser, e.g. `data:image/png;base64,...`.
    #[serde(default)]
    #[validate(length(min = 1, message = "No image provided"))]
    pub(crate) image: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranscriptionResponse {
    pub(crate) transcription: String,
}
