//! Flow backend: API client, wire types, model catalog.
//!
//! `FlowBackend` is the seam between orchestration logic and the real
//! HTTP client; orchestrator and refresher tests run against a mock.

pub mod catalog;
pub mod client;
pub mod models;

pub use client::FlowClient;

use async_trait::async_trait;
use catalog::ModelSpec;
use flowgate_types::error::{JobError, RefreshError};
use models::{CreditsInfo, ImageInput, SessionInfo, VideoOperation};

/// Auth and routing context for sandbox calls on behalf of one account.
#[derive(Debug, Clone)]
pub struct FlowAuth {
    pub access_token: String,
    pub project_id: String,
    pub paygate_tier: String,
    pub proxy_url: Option<String>,
}

/// Payload shape for an async video submission.
#[derive(Debug, Clone)]
pub enum VideoSubmission {
    /// Prompt only.
    Text,
    /// Start frame, optionally an end frame.
    Frames { start: String, end: Option<String> },
    /// Any number of reference assets.
    References { media_ids: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct VideoSubmitOutcome {
    pub operations: Vec<VideoOperation>,
    pub remaining_credits: Option<i64>,
}

#[async_trait]
pub trait FlowBackend: Send + Sync {
    /// Exchange a session token for a short-lived access token.
    ///
    /// `captcha_solution` is resubmitted after a `ChallengeRequired`
    /// rejection of the plain call.
    async fn fetch_session(
        &self,
        session_token: &str,
        captcha_solution: Option<&str>,
        proxy_url: Option<&str>,
    ) -> Result<SessionInfo, RefreshError>;

    /// Create a generation project, returning its id.
    async fn create_project(
        &self,
        session_token: &str,
        title: &str,
        proxy_url: Option<&str>,
    ) -> Result<String, JobError>;

    async fn fetch_credits(
        &self,
        access_token: &str,
        proxy_url: Option<&str>,
    ) -> Result<CreditsInfo, JobError>;

    /// Upload a reference image, returning its media id.
    async fn upload_image(
        &self,
        auth: &FlowAuth,
        bytes: &[u8],
        aspect_ratio: &str,
    ) -> Result<String, JobError>;

    /// Synchronous image generation; returns result URLs.
    async fn generate_images(
        &self,
        auth: &FlowAuth,
        spec: &ModelSpec,
        prompt: &str,
        inputs: Vec<ImageInput>,
    ) -> Result<Vec<String>, JobError>;

    /// Submit an async video task.
    async fn submit_video(
        &self,
        auth: &FlowAuth,
        spec: &ModelSpec,
        prompt: &str,
        submission: VideoSubmission,
    ) -> Result<VideoSubmitOutcome, JobError>;

    /// Poll pending operations; handles are echoed back updated.
    async fn check_video_status(
        &self,
        auth: &FlowAuth,
        operations: &[VideoOperation],
    ) -> Result<Vec<VideoOperation>, JobError>;
}
