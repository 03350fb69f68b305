use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatRole {
    User,
    Assistant,
}

/// One exchanged message. The browser keeps the full list and resends it every turn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct ChatTurn {
    pub(crate) role: ChatRole,
    pub(crate) content: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TutorRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "No transcription provided"))]
    pub(crate) transcription: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "No message provided"))]
    pub(crate) user_message: String,
    #[serde(default)]
    pub(crate) chat_history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TutorResponse {
    pub(crate) tutor_response: String,
}
