//! Flow API wire types.

use serde::{Deserialize, Serialize};

/// Session renewal result from the labs `auth/session` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub access_token: String,
    /// RFC 3339 expiry, e.g. `2025-11-15T04:46:04.000Z`
    pub expires: String,
    #[serde(default)]
    pub user: Option<SessionUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub email: Option<String>,
}

impl SessionInfo {
    /// Expiry as a unix timestamp, if the backend sent a parseable date.
    pub fn expires_at(&self) -> Option<i64> {
        chrono::DateTime::parse_from_rfc3339(&self.expires).ok().map(|dt| dt.timestamp())
    }
}

/// Balance from the sandbox `credits` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditsInfo {
    pub credits: i64,
    #[serde(rename = "userPaygateTier", default)]
    pub user_paygate_tier: Option<String>,
}

/// `:uploadUserImage` response wraps the id twice.
#[derive(Debug, Deserialize)]
pub struct UploadImageResponse {
    #[serde(rename = "mediaGenerationId")]
    pub media_generation_id: MediaGenerationId,
}

#[derive(Debug, Deserialize)]
pub struct MediaGenerationId {
    #[serde(rename = "mediaGenerationId")]
    pub media_generation_id: String,
}

/// Reference entry sent with image generation requests.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInput {
    pub name: String,
    #[serde(rename = "imageInputType")]
    pub image_input_type: String,
}

impl ImageInput {
    pub fn reference(media_id: String) -> Self {
        Self { name: media_id, image_input_type: "IMAGE_INPUT_TYPE_REFERENCE".to_string() }
    }
}

/// `flowMedia:batchGenerateImages` response.
#[derive(Debug, Deserialize)]
pub struct ImageGenerationResponse {
    #[serde(default)]
    pub media: Vec<GeneratedMedia>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedMedia {
    pub image: GeneratedMediaImage,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedMediaImage {
    #[serde(rename = "generatedImage")]
    pub generated_image: GeneratedImage,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedImage {
    #[serde(rename = "fifeUrl")]
    pub fife_url: String,
}

/// Operation handle from async video submission, echoed back verbatim
/// on every status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoOperation {
    pub operation: OperationRef,
    #[serde(rename = "sceneId", default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl VideoOperation {
    /// Video URL buried in the operation metadata once generation succeeds.
    pub fn video_url(&self) -> Option<String> {
        self.operation
            .metadata
            .as_ref()?
            .get("video")?
            .get("fifeUrl")?
            .as_str()
            .map(|s| s.to_string())
    }
}

/// Response shape shared by video submit and status-check calls.
#[derive(Debug, Deserialize)]
pub struct VideoBatchResponse {
    #[serde(default)]
    pub operations: Vec<VideoOperation>,
    #[serde(rename = "remainingCredits", default)]
    pub remaining_credits: Option<i64>,
}

/// Coarse interpretation of the `MEDIA_GENERATION_STATUS_*` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Pending,
    Successful,
    Error,
    Unknown,
}

impl MediaStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "MEDIA_GENERATION_STATUS_SUCCESSFUL" => Self::Successful,
            "MEDIA_GENERATION_STATUS_PENDING"
            | "MEDIA_GENERATION_STATUS_ACTIVE"
            | "MEDIA_GENERATION_STATUS_MEDIA_GENERATION_STATUS_UNSPECIFIED" => Self::Pending,
            s if s.starts_with("MEDIA_GENERATION_STATUS_ERROR")
                || s.starts_with("MEDIA_GENERATION_STATUS_FAILED") =>
            {
                Self::Error
            },
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry_parses() {
        let info: SessionInfo = serde_json::from_str(
            r#"{"access_token":"at","expires":"2025-11-15T04:46:04.000Z","user":{"email":"u@example.com"}}"#,
        )
        .unwrap();
        assert!(info.expires_at().unwrap() > 1_700_000_000);
        assert_eq!(info.user.unwrap().email.as_deref(), Some("u@example.com"));
    }

    #[test]
    fn test_video_url_extraction() {
        let op: VideoOperation = serde_json::from_str(
            r#"{
                "operation": {"name": "op-1", "metadata": {"video": {"fifeUrl": "https://v/x.mp4"}}},
                "status": "MEDIA_GENERATION_STATUS_SUCCESSFUL"
            }"#,
        )
        .unwrap();
        assert_eq!(op.video_url().as_deref(), Some("https://v/x.mp4"));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(MediaStatus::parse("MEDIA_GENERATION_STATUS_PENDING"), MediaStatus::Pending);
        assert_eq!(
            MediaStatus::parse("MEDIA_GENERATION_STATUS_SUCCESSFUL"),
            MediaStatus::Successful
        );
        assert_eq!(
            MediaStatus::parse("MEDIA_GENERATION_STATUS_ERROR_POLICY_VIOLATION"),
            MediaStatus::Error
        );
        assert_eq!(MediaStatus::parse("something-else"), MediaStatus::Unknown);
    }

    #[test]
    fn test_upload_response_double_wrap() {
        let resp: UploadImageResponse = serde_json::from_str(
            r#"{"mediaGenerationId":{"mediaGenerationId":"CAMabc"}}"#,
        )
        .unwrap();
        assert_eq!(resp.media_generation_id.media_generation_id, "CAMabc");
    }
}
