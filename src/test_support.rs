use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState};

pub(crate) const GEMINI_KEY: &str = "test-gemini-key";
pub(crate) const GROQ_KEY: &str = "test-groq-key";

/// Status and JSON body the stub answers with, consumed in order.
pub(crate) type StubReply = (StatusCode, String);

pub(crate) struct TestContext {
    pub(crate) app: Router,
    pub(crate) gemini: StubUpstream,
    pub(crate) groq: StubUpstream,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

/// Resets every variable `Settings::load` reads. Callers must hold `env_lock`.
pub(crate) fn set_test_env() {
    std::env::set_var("TUTOR_ENV", "test");
    std::env::set_var("TUTOR_HOST", "127.0.0.1");
    std::env::set_var("GEMINI_API_KEY", GEMINI_KEY);
    std::env::set_var("GROQ_API_KEY", GROQ_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    for key in [
        "TUTOR_PORT",
        "ENVIRONMENT",
        "PROJECT_NAME",
        "VERSION",
        "BACKEND_CORS_ORIGINS",
        "GEMINI_BASE_URL",
        "GEMINI_MODEL",
        "GEMINI_TIMEOUT_SECONDS",
        "GEMINI_MAX_RETRIES",
        "GEMINI_RETRY_BASE_DELAY_MS",
        "MAX_IMAGE_SIZE_MB",
        "GROQ_BASE_URL",
        "GROQ_MODEL",
        "GROQ_TEMPERATURE",
        "GROQ_MAX_TOKENS",
        "GROQ_TIMEOUT_SECONDS",
        "TUTOR_LOG_LEVEL",
        "TUTOR_LOG_JSON",
    ] {
        std::env::remove_var(key);
    }
}

/// Settings pointing both providers at local stubs, with millisecond retry delays.
/// Callers must hold `env_lock`.
pub(crate) fn settings_with_upstreams(gemini_base_url: &str, groq_base_url: &str) -> Settings {
    set_test_env();
    std::env::set_var("GEMINI_BASE_URL", gemini_base_url);
    std::env::set_var("GROQ_BASE_URL", groq_base_url);
    std::env::set_var("GEMINI_RETRY_BASE_DELAY_MS", "5");
    std::env::set_var("GEMINI_TIMEOUT_SECONDS", "5");
    std::env::set_var("GROQ_TIMEOUT_SECONDS", "5");
    Settings::load().expect("settings")
}

pub(crate) async fn setup_test_context(
    gemini_replies: Vec<StubReply>,
    groq_replies: Vec<StubReply>,
) -> TestContext {
    let gemini = StubUpstream::spawn(gemini_replies).await;
    let groq = StubUpstream::spawn(groq_replies).await;

    let settings = {
        let _guard = env_lock().await;
        settings_with_upstreams(&gemini.base_url, &groq.base_url)
    };
    let state = AppState::from_settings(settings).expect("state");
    let app = api::router::router(state);

    TestContext { app, gemini, groq }
}

/// Base URL of a port nothing listens on.
pub(crate) async fn unused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: serde_json::Value,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).and_then(|value| value.to_str().ok()).map(ToString::to_string)
    }
}

/// In-process HTTP server standing in for a model provider.
pub(crate) struct StubUpstream {
    pub(crate) base_url: String,
    inner: Arc<StubInner>,
}

struct StubInner {
    replies: StdMutex<VecDeque<StubReply>>,
    requests: StdMutex<Vec<RecordedRequest>>,
}

impl StubUpstream {
    pub(crate) async fn spawn(replies: Vec<StubReply>) -> Self {
        let inner = Arc::new(StubInner {
            replies: StdMutex::new(replies.into()),
            requests: StdMutex::new(Vec::new()),
        });
        let app = Router::new().fallback(stub_reply).with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { base_url: format!("http://{addr}"), inner }
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().expect("stub requests").clone()
    }
}

async fn stub_reply(
    State(inner): State<Arc<StubInner>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    inner.requests.lock().expect("stub requests").push(RecordedRequest {
        path: uri.path().to_string(),
        headers,
        body,
    });

    let (status, reply) = inner
        .replies
        .lock()
        .expect("stub replies")
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "{\"error\":\"stub exhausted\"}".into()));

    (status, [(header::CONTENT_TYPE, "application/json")], reply).into_response()
}

pub(crate) fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    let bytes = serde_json::to_vec(&body).expect("serialize body");
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("request body")
}

pub(crate) async fn read_json(response: Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
