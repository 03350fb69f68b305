use std::time::Instant;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::Settings;
use crate::core::metrics;
use crate::schemas::tutor::{ChatRole, ChatTurn};
use crate::services::upstream::{build_client, check_provider, ProviderHealth, UpstreamError};

const PROVIDER: &str = "Groq";

const TUTOR_SYSTEM_PROMPT: &str = "You are a friendly and knowledgeable math tutor. Your goal is \
to help students understand math concepts and solve problems step by step. Always be encouraging \
and provide clear, detailed explanations.";

/// Closing tag of the model's hidden deliberation block.
const REASONING_CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: MessageRole,
    pub(crate) content: String,
}

impl ChatMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

impl From<&ChatTurn> for ChatMessage {
    fn from(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            ChatRole::User => MessageRole::User,
            ChatRole::Assistant => MessageRole::Assistant,
        };
        Self::new(role, turn.content.clone())
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

/// Guides the student through a transcribed problem using a Groq chat-completion model.
#[derive(Debug, Clone)]
pub(crate) struct TutorService {
    client: Client,
    api_key: String,
    endpoint: String,
    model_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl TutorService {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let groq = settings.groq();
        let client = build_client(groq.timeout_seconds, PROVIDER)?;

        Ok(Self {
            client,
            api_key: groq.api_key.clone(),
            endpoint: format!("{}/chat/completions", groq.base_url),
            model_url: format!("{}/models/{}", groq.base_url, groq.model),
            model: groq.model.clone(),
            temperature: groq.temperature,
            max_tokens: groq.max_tokens,
        })
    }

    pub(crate) async fn check_health(&self) -> ProviderHealth {
        check_provider(self.client.get(&self.model_url).bearer_auth(&self.api_key)).await
    }

    pub(crate) async fn respond(
        &self,
        transcription: &str,
        history: &[ChatTurn],
        user_message: &str,
    ) -> Result<String, UpstreamError> {
        let messages = build_messages(transcription, history, user_message);
        let timer = Instant::now();

        tracing::info!(
            model = %self.model,
            history_turns = history.len(),
            message_count = messages.len(),
            "Sending Groq tutoring request"
        );

        let result = self.request_completion(&messages).await.map(|raw| strip_reasoning(&raw));
        let elapsed = timer.elapsed().as_secs_f64();

        match &result {
            Ok(reply) => {
                metrics::record_upstream(PROVIDER, "success", elapsed);
                tracing::info!(
                    duration_seconds = elapsed,
                    reply_chars = reply.chars().count(),
                    "Groq tutoring completed"
                );
            }
            Err(err) => {
                metrics::record_upstream(PROVIDER, err.outcome_label(), elapsed);
                tracing::error!(error = %err, duration_seconds = elapsed, "Groq tutoring failed");
            }
        }

        result
    }

    async fn request_completion(&self, messages: &[ChatMessage]) -> Result<String, UpstreamError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|source| UpstreamError::Unreachable { provider: PROVIDER, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| UpstreamError::Unreachable { provider: PROVIDER, source })?;

        if !status.is_success() {
            return Err(UpstreamError::Rejected { provider: PROVIDER, status, body });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|err| UpstreamError::Malformed {
            provider: PROVIDER,
            reason: format!("body is not JSON: {err}"),
        })?;

        extract_content(&parsed).map(ToString::to_string).ok_or_else(|| {
            tracing::error!(response = %parsed, "Unexpected Groq API response structure");
            UpstreamError::Malformed {
                provider: PROVIDER,
                reason: "missing choices[0].message.content".to_string(),
            }
        })
    }
}

/// System prompt, the problem as a synthetic first user turn, prior turns in order, then the
/// new message.
pub(crate) fn build_messages(
    transcription: &str,
    history: &[ChatTurn],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::new(MessageRole::System, TUTOR_SYSTEM_PROMPT));
    messages.push(ChatMessage::new(
        MessageRole::User,
        format!("Here is a math problem in markdown format:\n{transcription}"),
    ));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::new(MessageRole::User, user_message));
    messages
}

/// Keeps only what follows the last closing reasoning tag. Text without the tag is returned
/// unchanged.
pub(crate) fn strip_reasoning(raw: &str) -> String {
    match raw.rsplit_once(REASONING_CLOSE_TAG) {
        Some((_, answer)) => answer.trim().to_string(),
        None => raw.to_string(),
    }
}

fn extract_content(body: &Value) -> Option<&str> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
}
