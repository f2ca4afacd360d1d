//! HTTP client for the Flow API.
//!
//! Two surfaces: the labs base authenticates with the session-token
//! cookie (session renewal, project management), the sandbox base with a
//! Bearer access token (credits, uploads, generation). Generation calls
//! carry a recaptcha token from the collaborator; a solve failure
//! degrades to an empty token rather than failing the job outright.

use super::catalog::ModelSpec;
use super::models::{
    CreditsInfo, ImageGenerationResponse, ImageInput, SessionInfo, UploadImageResponse,
    VideoBatchResponse, VideoOperation,
};
use super::{FlowAuth, FlowBackend, VideoSubmission, VideoSubmitOutcome};
use crate::captcha::CaptchaSolver;
use crate::config::FlowEndpoints;
use crate::outbound::ProxyPool;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flowgate_types::error::{JobError, RefreshError, TerminalReason};
use rand::Rng;
use serde_json::json;
use std::sync::Arc;

const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

pub struct FlowClient {
    pool: Arc<ProxyPool>,
    endpoints: FlowEndpoints,
    solver: Arc<dyn CaptchaSolver>,
}

impl FlowClient {
    pub fn new(
        pool: Arc<ProxyPool>,
        endpoints: FlowEndpoints,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        Self { pool, endpoints, solver }
    }

    async fn client(&self, proxy_url: Option<&str>) -> Result<reqwest::Client, JobError> {
        self.pool
            .client_for(proxy_url)
            .await
            .map_err(|e| JobError::Submission { message: e })
    }

    /// sessionId the Flow frontend would send: `;{epoch_millis}`.
    fn session_id() -> String {
        format!(";{}", chrono::Utc::now().timestamp_millis())
    }

    fn seed() -> u32 {
        rand::thread_rng().gen_range(1..100_000)
    }

    /// Best-effort recaptcha token for a generation call.
    async fn recaptcha_token(&self) -> String {
        match self.solver.solve().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "captcha solve failed, submitting without token");
                String::new()
            },
        }
    }

    async fn post_sandbox(
        &self,
        auth: &FlowAuth,
        url: String,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, JobError> {
        let client = self.client(auth.proxy_url.as_deref()).await?;
        let response = client
            .post(&url)
            .bearer_auth(&auth.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Submission { message: format!("{}: {}", url, e) })?;
        classify_response(response).await
    }
}

/// Map a non-success status onto the job error taxonomy.
async fn classify_response(response: reqwest::Response) -> Result<reqwest::Response, JobError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{}: {}", status, truncate(&body, 400));

    let error = match status.as_u16() {
        401 | 403 => JobError::Terminal { reason: TerminalReason::AuthFailure, message },
        429 => JobError::Terminal { reason: TerminalReason::RateLimited, message },
        400 => {
            let lower = body.to_lowercase();
            if lower.contains("policy") || lower.contains("safety") {
                JobError::Terminal { reason: TerminalReason::ContentPolicy, message }
            } else if lower.contains("credit") {
                JobError::Terminal { reason: TerminalReason::CreditExhausted, message }
            } else {
                JobError::InvalidRequest { message }
            }
        },
        // 5xx is the backend refusing the call, not the job itself;
        // submission-stage callers retry it on another account
        s if s >= 500 => JobError::Submission { message },
        _ => JobError::Terminal { reason: TerminalReason::BackendError, message },
    };
    Err(error)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl FlowBackend for FlowClient {
    async fn fetch_session(
        &self,
        session_token: &str,
        captcha_solution: Option<&str>,
        proxy_url: Option<&str>,
    ) -> Result<SessionInfo, RefreshError> {
        let client = self
            .pool
            .client_for(proxy_url)
            .await
            .map_err(|e| RefreshError::Network { message: e })?;

        let url = format!("{}/auth/session", self.endpoints.labs_base);
        let mut request = client
            .get(&url)
            .header("Cookie", format!("{}={}", SESSION_COOKIE, session_token));
        if let Some(solution) = captcha_solution {
            request = request.header("x-recaptcha-token", solution);
        }
        let response = request
            .send()
            .await
            .map_err(|e| RefreshError::Network { message: format!("auth/session: {}", e) })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(RefreshError::AuthRejected {
                id: String::new(),
                message: format!("auth/session returned {}", status),
            });
        }
        if status.as_u16() == 428 {
            return Err(RefreshError::ChallengeRequired);
        }
        if !status.is_success() {
            return Err(RefreshError::Network {
                message: format!("auth/session returned {}", status),
            });
        }

        // An invalid session token yields 200 with an empty body.
        let value: serde_json::Value = response.json().await.map_err(|e| {
            RefreshError::MalformedResponse { message: format!("auth/session body: {}", e) }
        })?;
        if value.get("access_token").and_then(|v| v.as_str()).is_none() {
            return Err(RefreshError::AuthRejected {
                id: String::new(),
                message: "session token no longer yields an access token".to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| RefreshError::MalformedResponse {
            message: format!("auth/session shape: {}", e),
        })
    }

    async fn create_project(
        &self,
        session_token: &str,
        title: &str,
        proxy_url: Option<&str>,
    ) -> Result<String, JobError> {
        let client = self.client(proxy_url).await?;
        let url = format!("{}/trpc/project.createProject", self.endpoints.labs_base);
        let body = json!({"json": {"projectTitle": title, "toolName": "PINHOLE"}});

        let response = client
            .post(&url)
            .header("Cookie", format!("{}={}", SESSION_COOKIE, session_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Submission { message: format!("createProject: {}", e) })?;
        let response = classify_response(response).await?;

        let value: serde_json::Value = response.json().await.map_err(|e| {
            JobError::Submission { message: format!("createProject body: {}", e) }
        })?;
        value
            .pointer("/result/data/json/result/projectId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| JobError::Submission {
                message: "createProject response missing projectId".to_string(),
            })
    }

    async fn fetch_credits(
        &self,
        access_token: &str,
        proxy_url: Option<&str>,
    ) -> Result<CreditsInfo, JobError> {
        let client = self.client(proxy_url).await?;
        let url = format!("{}/credits", self.endpoints.sandbox_base);
        let response = client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| JobError::Submission { message: format!("credits: {}", e) })?;
        let response = classify_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| JobError::Submission { message: format!("credits body: {}", e) })
    }

    async fn upload_image(
        &self,
        auth: &FlowAuth,
        bytes: &[u8],
        aspect_ratio: &str,
    ) -> Result<String, JobError> {
        // Video ratios map onto their image counterpart for uploads.
        let image_ratio = aspect_ratio.replace("VIDEO_", "IMAGE_");
        let url = format!("{}:uploadUserImage", self.endpoints.sandbox_base);
        let body = json!({
            "imageInput": {
                "rawImageBytes": STANDARD.encode(bytes),
                "mimeType": "image/jpeg",
                "isUserUploaded": true,
                "aspectRatio": image_ratio,
            },
            "clientContext": {
                "sessionId": Self::session_id(),
                "tool": "ASSET_MANAGER",
            }
        });

        let response = self.post_sandbox(auth, url, body).await?;
        let parsed: UploadImageResponse = response
            .json()
            .await
            .map_err(|e| JobError::Submission { message: format!("upload body: {}", e) })?;
        Ok(parsed.media_generation_id.media_generation_id)
    }

    async fn generate_images(
        &self,
        auth: &FlowAuth,
        spec: &ModelSpec,
        prompt: &str,
        inputs: Vec<ImageInput>,
    ) -> Result<Vec<String>, JobError> {
        let url = format!(
            "{}/projects/{}/flowMedia:batchGenerateImages",
            self.endpoints.sandbox_base, auth.project_id
        );
        let recaptcha_token = self.recaptcha_token().await;
        let session_id = Self::session_id();

        let body = json!({
            "clientContext": {
                "recaptchaToken": recaptcha_token,
                "sessionId": session_id,
            },
            "requests": [{
                "clientContext": {
                    "recaptchaToken": recaptcha_token,
                    "projectId": auth.project_id,
                    "sessionId": session_id,
                    "tool": "PINHOLE",
                },
                "seed": Self::seed(),
                "imageModelName": spec.backend_name,
                "imageAspectRatio": spec.aspect_ratio,
                "prompt": prompt,
                "imageInputs": inputs,
            }]
        });

        let response = self.post_sandbox(auth, url, body).await?;
        let parsed: ImageGenerationResponse = response
            .json()
            .await
            .map_err(|e| JobError::Submission { message: format!("image gen body: {}", e) })?;

        let urls: Vec<String> =
            parsed.media.into_iter().map(|m| m.image.generated_image.fife_url).collect();
        if urls.is_empty() {
            return Err(JobError::Terminal {
                reason: TerminalReason::BackendError,
                message: "image generation returned no media".to_string(),
            });
        }
        Ok(urls)
    }

    async fn submit_video(
        &self,
        auth: &FlowAuth,
        spec: &ModelSpec,
        prompt: &str,
        submission: VideoSubmission,
    ) -> Result<VideoSubmitOutcome, JobError> {
        let endpoint = match &submission {
            VideoSubmission::Text => "video:batchAsyncGenerateVideoText",
            VideoSubmission::Frames { .. } => "video:batchAsyncGenerateVideoStartAndEndImage",
            VideoSubmission::References { .. } => "video:batchAsyncGenerateVideoReferenceImages",
        };
        let url = format!("{}/{}", self.endpoints.sandbox_base, endpoint);
        let recaptcha_token = self.recaptcha_token().await;

        let mut request = json!({
            "aspectRatio": spec.aspect_ratio,
            "seed": Self::seed(),
            "textInput": {"prompt": prompt},
            "videoModelKey": spec.backend_name,
            "metadata": {"sceneId": uuid::Uuid::new_v4().to_string()},
        });
        match submission {
            VideoSubmission::Text => {},
            VideoSubmission::Frames { start, end } => {
                request["startImage"] = json!({"mediaId": start});
                if let Some(end) = end {
                    request["endImage"] = json!({"mediaId": end});
                }
            },
            VideoSubmission::References { media_ids } => {
                let refs: Vec<serde_json::Value> = media_ids
                    .into_iter()
                    .map(|id| json!({"imageUsageType": "IMAGE_USAGE_TYPE_ASSET", "mediaId": id}))
                    .collect();
                request["referenceImages"] = json!(refs);
            },
        }

        let body = json!({
            "clientContext": {
                "recaptchaToken": recaptcha_token,
                "sessionId": Self::session_id(),
                "projectId": auth.project_id,
                "tool": "PINHOLE",
                "userPaygateTier": auth.paygate_tier,
            },
            "requests": [request],
        });

        let response = self.post_sandbox(auth, url, body).await?;
        let parsed: VideoBatchResponse = response
            .json()
            .await
            .map_err(|e| JobError::Submission { message: format!("video submit body: {}", e) })?;

        if parsed.operations.is_empty() {
            return Err(JobError::Submission {
                message: "video submission returned no operations".to_string(),
            });
        }
        Ok(VideoSubmitOutcome {
            operations: parsed.operations,
            remaining_credits: parsed.remaining_credits,
        })
    }

    async fn check_video_status(
        &self,
        auth: &FlowAuth,
        operations: &[VideoOperation],
    ) -> Result<Vec<VideoOperation>, JobError> {
        let url =
            format!("{}/video:batchCheckAsyncVideoGenerationStatus", self.endpoints.sandbox_base);
        let body = json!({"operations": operations});

        let client = self.client(auth.proxy_url.as_deref()).await?;
        let response = client
            .post(&url)
            .bearer_auth(&auth.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Poll { attempts: 1, message: format!("status check: {}", e) })?;
        let response = classify_response(response).await?;

        let parsed: VideoBatchResponse = response.json().await.map_err(|e| JobError::Poll {
            attempts: 1,
            message: format!("status body: {}", e),
        })?;
        Ok(parsed.operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowEndpoints;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullSolver;

    #[async_trait]
    impl CaptchaSolver for NullSolver {
        async fn solve(&self) -> Result<String, RefreshError> {
            Ok("rc-token".to_string())
        }
    }

    fn client_for(server: &MockServer) -> FlowClient {
        let endpoints =
            FlowEndpoints { labs_base: server.uri(), sandbox_base: server.uri() };
        FlowClient::new(Arc::new(ProxyPool::new().unwrap()), endpoints, Arc::new(NullSolver))
    }

    fn auth() -> FlowAuth {
        FlowAuth {
            access_token: "at".to_string(),
            project_id: "proj-1".to_string(),
            paygate_tier: "PAYGATE_TIER_ONE".to_string(),
            proxy_url: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_session_sends_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/session"))
            .and(header("Cookie", "__Secure-next-auth.session-token=st-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-new",
                "expires": "2026-01-01T00:00:00.000Z",
                "user": {"email": "u@example.com"}
            })))
            .mount(&server)
            .await;

        let session = client_for(&server).fetch_session("st-1", None, None).await.unwrap();
        assert_eq!(session.access_token, "at-new");
    }

    #[tokio::test]
    async fn test_fetch_session_empty_body_is_auth_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_session("st-bad", None, None).await.unwrap_err();
        assert!(matches!(err, RefreshError::AuthRejected { .. }));
    }

    #[tokio::test]
    async fn test_fetch_session_428_demands_challenge() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/session"))
            .respond_with(ResponseTemplate::new(428))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_session("st-1", None, None).await.unwrap_err();
        assert!(matches!(err, RefreshError::ChallengeRequired));
    }

    #[tokio::test]
    async fn test_generate_images_extracts_urls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj-1/flowMedia:batchGenerateImages"))
            .and(body_partial_json(serde_json::json!({
                "clientContext": {"recaptchaToken": "rc-token"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "media": [
                    {"image": {"generatedImage": {"fifeUrl": "https://img/1.png"}}}
                ]
            })))
            .mount(&server)
            .await;

        let spec = crate::flow::catalog::lookup("gemini-2.5-flash-image-landscape").unwrap();
        let urls = client_for(&server)
            .generate_images(&auth(), spec, "a cat", Vec::new())
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://img/1.png".to_string()]);
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video:batchAsyncGenerateVideoText"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let spec = crate::flow::catalog::lookup("veo_3_1_t2v_fast_landscape").unwrap();
        let err = client_for(&server)
            .submit_video(&auth(), spec, "a dog", VideoSubmission::Text)
            .await
            .unwrap_err();
        assert!(
            matches!(err, JobError::Terminal { reason: TerminalReason::RateLimited, .. }),
            "got {:?}",
            err
        );
        assert!(err.is_account_level());
    }

    #[tokio::test]
    async fn test_5xx_submit_maps_to_submission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video:batchAsyncGenerateVideoText"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
            .mount(&server)
            .await;

        let spec = crate::flow::catalog::lookup("veo_3_1_t2v_fast_landscape").unwrap();
        let err = client_for(&server)
            .submit_video(&auth(), spec, "a dog", VideoSubmission::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Submission { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_policy_400_is_request_level() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj-1/flowMedia:batchGenerateImages"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"policy violation"}"#),
            )
            .mount(&server)
            .await;

        let spec = crate::flow::catalog::lookup("imagen-4.0-generate-preview-landscape").unwrap();
        let err = client_for(&server)
            .generate_images(&auth(), spec, "bad prompt", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Terminal { reason: TerminalReason::ContentPolicy, .. }));
        assert!(!err.is_account_level());
    }
}
