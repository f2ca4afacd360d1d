//! Job model: generation requests, kinds, states, and progress payloads.

use serde::{Deserialize, Serialize};

/// What kind of generation a job performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Prompt → image (synchronous at the backend)
    TextToImage,
    /// Prompt + reference image(s) → image
    ImageToImage,
    /// Prompt → video
    TextToVideo,
    /// Prompt + start frame → video
    ImageToVideo,
    /// Prompt + start and end frames → video
    FirstLastFrame,
    /// Prompt + any number of reference images → video
    ReferenceToVideo,
}

impl GenerationKind {
    /// Video jobs run asynchronously at the backend and are polled.
    pub const fn is_video(&self) -> bool {
        !matches!(self, Self::TextToImage | Self::ImageToImage)
    }

    /// Bounds on the number of reference images this kind accepts.
    /// `None` upper bound means unlimited.
    pub const fn image_bounds(&self) -> (usize, Option<usize>) {
        match self {
            Self::TextToImage | Self::TextToVideo => (0, Some(0)),
            Self::ImageToImage => (1, None),
            Self::ImageToVideo => (1, Some(1)),
            Self::FirstLastFrame => (2, Some(2)),
            Self::ReferenceToVideo => (0, None),
        }
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TextToImage => "text-to-image",
            Self::ImageToImage => "image-to-image",
            Self::TextToVideo => "text-to-video",
            Self::ImageToVideo => "image-to-video",
            Self::FirstLastFrame => "first-last-frame",
            Self::ReferenceToVideo => "multi-reference-to-video",
        };
        f.write_str(name)
    }
}

/// Output orientation, encoded in the client-facing model name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// A reference image attached to a generation request.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Raw image bytes (decoded from the client's base64 data URL)
    #[serde(with = "serde_bytes_b64")]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceImage").field("len", &self.bytes.len()).finish()
    }
}

/// Base64 (de)serialization for raw image bytes so requests stay loggable.
mod serde_bytes_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Backend-agnostic generation request, produced by the boundary adapter.
///
/// Kind and orientation are not carried here; the orchestrator derives
/// both from the model name and the image count via the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Client-facing model name (selects kind, backend model key, orientation)
    pub model: String,
    /// Prompt text
    pub prompt: String,
    /// Reference images, in client order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ReferenceImage>,
}

/// State of one job against the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted by the backend, handle issued
    Submitted,
    /// Actively polling/streaming backend progress
    Polling,
    /// At least one partial result has been emitted
    PartialResult,
    /// Final asset URL(s) delivered
    Completed,
    /// Terminal failure
    Failed,
}

impl JobState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Incremental payload carried by a partial-result event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressPayload {
    /// Backend progress percentage (0-100)
    Percent { value: u8 },
    /// Human-readable status line (upload progress, queue position)
    Status { text: String },
    /// Preview frame or partial asset URL delivered before completion
    Preview { url: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_image_bounds() {
        assert_eq!(GenerationKind::TextToVideo.image_bounds(), (0, Some(0)));
        assert_eq!(GenerationKind::ImageToVideo.image_bounds(), (1, Some(1)));
        assert_eq!(GenerationKind::FirstLastFrame.image_bounds(), (2, Some(2)));
        assert_eq!(GenerationKind::ReferenceToVideo.image_bounds(), (0, None));
    }

    #[test]
    fn test_video_classification() {
        assert!(!GenerationKind::TextToImage.is_video());
        assert!(!GenerationKind::ImageToImage.is_video());
        assert!(GenerationKind::FirstLastFrame.is_video());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::PartialResult.is_terminal());
    }

    #[test]
    fn test_reference_image_roundtrip() {
        let img = ReferenceImage { bytes: vec![1, 2, 3, 255] };
        let json = serde_json::to_string(&img).unwrap();
        let back: ReferenceImage = serde_json::from_str(&json).unwrap();
        assert_eq!(img, back);
    }
}
