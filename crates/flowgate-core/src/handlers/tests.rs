use super::*;
use crate::captcha::CaptchaSolver;
use crate::flow::catalog::ModelSpec;
use crate::flow::models::{CreditsInfo, ImageInput, SessionInfo, VideoOperation};
use crate::flow::{FlowAuth, FlowBackend, VideoSubmission, VideoSubmitOutcome};
use crate::refresh::TokenRefresher;
use crate::select::AccountSelector;
use crate::config::TuningConfig;
use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use flowgate_types::error::{JobError, RefreshError};
use flowgate_types::models::AccountConfig;

/// Happy-path backend: every generation succeeds immediately.
struct SunnyBackend;

#[async_trait]
impl FlowBackend for SunnyBackend {
    async fn fetch_session(
        &self,
        _session_token: &str,
        _captcha_solution: Option<&str>,
        _proxy_url: Option<&str>,
    ) -> Result<SessionInfo, RefreshError> {
        Ok(SessionInfo {
            access_token: "at".to_string(),
            expires: (chrono::Utc::now() + chrono::Duration::hours(6)).to_rfc3339(),
            user: None,
        })
    }

    async fn create_project(
        &self,
        _session_token: &str,
        _title: &str,
        _proxy_url: Option<&str>,
    ) -> Result<String, JobError> {
        Ok("proj".to_string())
    }

    async fn fetch_credits(
        &self,
        _access_token: &str,
        _proxy_url: Option<&str>,
    ) -> Result<CreditsInfo, JobError> {
        Ok(CreditsInfo { credits: 100, user_paygate_tier: None })
    }

    async fn upload_image(
        &self,
        _auth: &FlowAuth,
        _bytes: &[u8],
        _aspect_ratio: &str,
    ) -> Result<String, JobError> {
        Ok("media-1".to_string())
    }

    async fn generate_images(
        &self,
        _auth: &FlowAuth,
        _spec: &ModelSpec,
        _prompt: &str,
        _inputs: Vec<ImageInput>,
    ) -> Result<Vec<String>, JobError> {
        Ok(vec!["https://cdn.example/out.png".to_string()])
    }

    async fn submit_video(
        &self,
        _auth: &FlowAuth,
        _spec: &ModelSpec,
        _prompt: &str,
        _submission: VideoSubmission,
    ) -> Result<VideoSubmitOutcome, JobError> {
        Ok(VideoSubmitOutcome { operations: Vec::new(), remaining_credits: None })
    }

    async fn check_video_status(
        &self,
        _auth: &FlowAuth,
        _operations: &[VideoOperation],
    ) -> Result<Vec<VideoOperation>, JobError> {
        Ok(Vec::new())
    }
}

struct NoSolver;

#[async_trait]
impl CaptchaSolver for NoSolver {
    async fn solve(&self) -> Result<String, RefreshError> {
        Ok(String::new())
    }
}

fn test_server(api_keys: Vec<String>) -> axum_test::TestServer {
    let store = Arc::new(CredentialStore::new(3));
    store.load_accounts(vec![AccountConfig {
        id: "a1".to_string(),
        session_token: "st".to_string(),
        proxy_url: None,
        max_concurrent: 4,
        project_id: Some("proj".to_string()),
        kinds: Vec::new(),
    }]);
    let far = chrono::Utc::now().timestamp() + 86_400;
    store.update_token("a1", "at".to_string(), far, None).unwrap();
    store.update_credits("a1", 100, None).unwrap();

    let backend: Arc<dyn FlowBackend> = Arc::new(SunnyBackend);
    let tuning = TuningConfig::default();
    let refresher = Arc::new(TokenRefresher::new(
        Arc::clone(&store),
        Arc::clone(&backend),
        Arc::new(NoSolver),
        tuning.clone(),
    ));
    let selector =
        Arc::new(AccountSelector::new(Arc::clone(&store), refresher, tuning.clone()));
    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::clone(&store),
        backend,
        selector,
        tuning,
    ));

    let state = AppState { orchestrator, store, api_keys: Arc::new(api_keys) };
    axum_test::TestServer::new(build_router(state)).unwrap()
}

fn bearer(key: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {key}")).unwrap(),
    )
}

#[tokio::test]
async fn test_health_is_open_without_key() {
    let server = test_server(vec!["sk-test".to_string()]);
    let response = server.get("/health").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["accounts"], 1);
}

#[tokio::test]
async fn test_models_requires_key_when_configured() {
    let server = test_server(vec!["sk-test".to_string()]);

    let denied = server.get("/v1/models").await;
    denied.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let (name, value) = bearer("sk-test");
    let allowed = server.get("/v1/models").add_header(name, value).await;
    allowed.assert_status_ok();
    let json: serde_json::Value = allowed.json();
    assert_eq!(json["object"], "list");
    assert_eq!(json["data"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_empty_key_list_disables_auth() {
    let server = test_server(Vec::new());
    let response = server.get("/v1/models").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_chat_completion_non_stream_returns_image_markdown() {
    let server = test_server(Vec::new());
    let response = server
        .post("/v1/chat/completions")
        .json(&serde_json::json!({
            "model": "gemini-2.5-flash-image-landscape",
            "messages": [{"role": "user", "content": "a lighthouse at dusk"}],
        }))
        .await;

    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["object"], "chat.completion");
    let content = json["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("![Generated Image](https://cdn.example/out.png)"));
}

#[tokio::test]
async fn test_chat_completion_stream_terminates_with_done() {
    let server = test_server(Vec::new());
    let response = server
        .post("/v1/chat/completions")
        .json(&serde_json::json!({
            "model": "gemini-2.5-flash-image-landscape",
            "messages": [{"role": "user", "content": "a lighthouse at dusk"}],
            "stream": true,
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let text = response.text();
    assert!(text.contains("chat.completion.chunk"));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn test_unknown_model_is_bad_request() {
    let server = test_server(Vec::new());
    let response = server
        .post("/v1/chat/completions")
        .json(&serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hello"}],
        }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let json: serde_json::Value = response.json();
    assert_eq!(json["error"]["type"], "invalid_request_error");
}
