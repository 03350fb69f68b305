use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::core::metrics;
use crate::services::data_url::DataUrlImage;
use crate::services::upstream::{
    build_client, check_provider, ProviderHealth, RetryPolicy, UpstreamError,
};

const PROVIDER: &str = "Gemini";

const TRANSCRIPTION_PROMPT: &str = "You are a math problem transcriber. Convert this math problem \
into clear markdown format. Include any mathematical notation using LaTeX syntax. Only provide \
the transcription, no explanations or solutions.";

/// Turns a photo of a math problem into markdown with LaTeX using a Gemini vision model.
#[derive(Debug, Clone)]
pub(crate) struct TranscriptionService {
    client: Client,
    api_key: String,
    model_url: String,
    endpoint: String,
    retry: RetryPolicy,
    max_image_bytes: usize,
}

impl TranscriptionService {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let gemini = settings.gemini();
        let client = build_client(gemini.timeout_seconds, PROVIDER)?;

        let model_url = format!("{}/models/{}", gemini.base_url, gemini.model);

        Ok(Self {
            client,
            api_key: gemini.api_key.clone(),
            endpoint: format!("{model_url}:generateContent"),
            model_url,
            retry: RetryPolicy::new(gemini.max_retries, gemini.retry_base_delay()),
            max_image_bytes: gemini.max_image_bytes(),
        })
    }

    pub(crate) fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    pub(crate) async fn check_health(&self) -> ProviderHealth {
        check_provider(self.client.get(&self.model_url).header("x-goog-api-key", &self.api_key))
            .await
    }

    pub(crate) async fn transcribe(
        &self,
        image: &DataUrlImage<'_>,
    ) -> Result<String, UpstreamError> {
        let timer = Instant::now();
        let result = self.request_with_retry(image).await;
        let elapsed = timer.elapsed().as_secs_f64();

        match &result {
            Ok(text) => {
                metrics::record_upstream(PROVIDER, "success", elapsed);
                tracing::info!(
                    duration_seconds = elapsed,
                    transcription_chars = text.chars().count(),
                    "Gemini transcription completed"
                );
            }
            Err(err) => {
                metrics::record_upstream(PROVIDER, err.outcome_label(), elapsed);
                tracing::error!(
                    error = %err,
                    duration_seconds = elapsed,
                    "Gemini transcription failed"
                );
            }
        }

        result
    }

    async fn request_with_retry(&self, image: &DataUrlImage<'_>) -> Result<String, UpstreamError> {
        let payload = json!({
            "contents": [{
                "parts": [
                    {"text": TRANSCRIPTION_PROMPT},
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": image.payload
                        }
                    }
                ]
            }]
        });

        let mut attempt = 0;
        loop {
            tracing::info!(
                attempt,
                mime_type = image.mime_type,
                "Sending Gemini transcription request"
            );

            let response = self
                .client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&payload)
                .send()
                .await
                .map_err(|source| UpstreamError::Unreachable { provider: PROVIDER, source })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|source| UpstreamError::Unreachable { provider: PROVIDER, source })?;

            if status.is_success() {
                return parse_transcription(&body);
            }

            match self.retry.delay_after(attempt, status) {
                Some(delay) => {
                    tracing::warn!(
                        status = status.as_u16(),
                        retry = attempt + 1,
                        delay_ms = delay_millis(delay),
                        "Gemini unavailable, retrying"
                    );
                    metrics::record_retry(PROVIDER);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(UpstreamError::Rejected { provider: PROVIDER, status, body });
                }
            }
        }
    }
}

fn parse_transcription(body: &str) -> Result<String, UpstreamError> {
    let parsed: Value = serde_json::from_str(body).map_err(|err| UpstreamError::Malformed {
        provider: PROVIDER,
        reason: format!("body is not JSON: {err}"),
    })?;

    extract_transcription(&parsed).map(ToString::to_string).ok_or_else(|| {
        tracing::error!(response = %parsed, "Unexpected Gemini API response structure");
        UpstreamError::Malformed {
            provider: PROVIDER,
            reason: "missing candidates[0].content.parts[0].text".to_string(),
        }
    })
}

fn extract_transcription(body: &Value) -> Option<&str> {
    body.get("candidates")
        .and_then(|candidates| candidates.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.get(0))
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

fn delay_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::test_support::{self, StubUpstream};

    const IMAGE: &str = "data:image/png;base64,aGVsbG8=";

    fn gemini_reply(text: &str) -> String {
        json!({
            "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
        })
        .to_string()
    }

    async fn service_for(stub: &StubUpstream) -> TranscriptionService {
        let _guard = test_support::env_lock().await;
        let settings = test_support::settings_with_upstreams(&stub.base_url, "http://127.0.0.1:9");
        TranscriptionService::from_settings(&settings).expect("service")
    }

    fn image() -> DataUrlImage<'static> {
        DataUrlImage::parse(IMAGE, 1024).expect("image")
    }

    #[tokio::test]
    async fn returns_transcription_verbatim() {
        let stub = StubUpstream::spawn(vec![(StatusCode::OK, gemini_reply("  $x^2 = 4$\n"))]).await;
        let service = service_for(&stub).await;

        let text = service.transcribe(&image()).await.expect("transcription");
        assert_eq!(text, "  $x^2 = 4$\n");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.path, "/models/gemini-1.5-flash:generateContent");
        assert_eq!(request.header("x-goog-api-key").as_deref(), Some(test_support::GEMINI_KEY));
        let parts = &request.body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], TRANSCRIPTION_PROMPT);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "aGVsbG8=");
    }

    #[tokio::test]
    async fn retries_service_unavailable_then_succeeds() {
        let unavailable =
            (StatusCode::SERVICE_UNAVAILABLE, "{\"error\":\"overloaded\"}".to_string());
        let stub = StubUpstream::spawn(vec![
            unavailable.clone(),
            unavailable.clone(),
            unavailable,
            (StatusCode::OK, gemini_reply("solved")),
        ])
        .await;
        let service = service_for(&stub).await;

        let text = service.transcribe(&image()).await.expect("transcription");
        assert_eq!(text, "solved");
        assert_eq!(stub.requests().len(), 4);
    }

    #[tokio::test]
    async fn gives_up_after_three_retries() {
        let unavailable = (StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string());
        let stub = StubUpstream::spawn(vec![unavailable; 6]).await;
        let service = service_for(&stub).await;

        let err = service.transcribe(&image()).await.unwrap_err();
        match err {
            UpstreamError::Rejected { status, body, .. } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stub.requests().len(), 4);
    }

    #[tokio::test]
    async fn waits_with_doubling_delays_between_retries() {
        let unavailable = (StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string());
        let stub = StubUpstream::spawn(vec![unavailable; 4]).await;
        let service = service_for(&stub).await;
        let base_delay = service.retry.base_delay;

        let started = Instant::now();
        let err = service.transcribe(&image()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, UpstreamError::Rejected { .. }), "{err}");
        assert_eq!(stub.requests().len(), 4);
        // 1x + 2x + 4x the base delay
        assert!(elapsed >= base_delay * 7, "elapsed {elapsed:?}, base {base_delay:?}");
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let stub = StubUpstream::spawn(vec![
            (StatusCode::BAD_REQUEST, "{\"error\":\"bad image\"}".to_string()),
            (StatusCode::OK, gemini_reply("never reached")),
        ])
        .await;
        let service = service_for(&stub).await;

        let err = service.transcribe(&image()).await.unwrap_err();
        assert!(
            matches!(err, UpstreamError::Rejected { status: StatusCode::BAD_REQUEST, .. }),
            "{err}"
        );
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn missing_text_is_malformed() {
        let reply = json!({"candidates": []}).to_string();
        let stub = StubUpstream::spawn(vec![(StatusCode::OK, reply)]).await;
        let service = service_for(&stub).await;

        let err = service.transcribe(&image()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed { .. }), "{err}");
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let stub = StubUpstream::spawn(vec![(StatusCode::OK, "<html>".to_string())]).await;
        let service = service_for(&stub).await;

        let err = service.transcribe(&image()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed { .. }), "{err}");
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let base_url = test_support::unused_base_url().await;
        let settings = {
            let _guard = test_support::env_lock().await;
            test_support::settings_with_upstreams(&base_url, &base_url)
        };
        let service = TranscriptionService::from_settings(&settings).expect("service");

        let err = service.transcribe(&image()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unreachable { .. }), "{err}");
    }

    #[tokio::test]
    async fn health_check_reads_model_metadata() {
        let stub = StubUpstream::spawn(vec![
            (StatusCode::OK, json!({"name": "models/gemini-1.5-flash"}).to_string()),
            (StatusCode::FORBIDDEN, "{}".to_string()),
        ])
        .await;
        let service = service_for(&stub).await;

        assert_eq!(service.check_health().await, ProviderHealth::Healthy);
        let failed = service.check_health().await;
        assert_eq!(failed, ProviderHealth::Unhealthy("status 403 Forbidden".to_string()));

        let requests = stub.requests();
        assert_eq!(requests[0].path, "/models/gemini-1.5-flash");
        assert_eq!(requests[0].header("x-goog-api-key").as_deref(), Some(test_support::GEMINI_KEY));
    }

    #[test]
    fn extract_transcription_requires_non_empty_text() {
        let with_text =
            |text: Value| json!({"candidates": [{"content": {"parts": [{"text": text}]}}]});

        assert_eq!(extract_transcription(&json!({})), None);
        assert_eq!(extract_transcription(&json!({"candidates": [{}]})), None);
        assert_eq!(extract_transcription(&with_text(json!(""))), None);
        assert_eq!(extract_transcription(&with_text(json!(3))), None);
        assert_eq!(extract_transcription(&with_text(json!("x"))), Some("x"));
    }
}
