//! OpenAI chat-completions boundary adapter.
//!
//! Translates the literal OpenAI request shape into a
//! `GenerationRequest` and hands it to the orchestrator; nothing past
//! this module knows about chat messages.

use super::sse;
use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flowgate_types::error::{AdmissionError, JobError, TypedError};
use flowgate_types::models::{GenerationRequest, ReferenceImage};
use flowgate_types::protocol::openai::{
    ChatCompletionRequest, ModelEntry, ModelList, OpenAIContent, OpenAIContentPart, OpenAIRole,
};
use regex::Regex;
use std::sync::OnceLock;

use crate::flow::catalog;

static DATA_URL_REGEX: OnceLock<Regex> = OnceLock::new();

fn data_url_regex() -> &'static Regex {
    DATA_URL_REGEX.get_or_init(|| {
        Regex::new(r"^data:image/[a-zA-Z0-9.+-]+;base64,(?P<payload>.+)$")
            .expect("Data url regex is valid")
    })
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let wants_stream = request.stream;
    let generation = match to_generation_request(&request) {
        Ok(g) => g,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let model = generation.model.clone();
    let is_video = catalog::lookup(&model).map(|s| s.is_video()).unwrap_or(false);

    let events = match state.orchestrator.run(generation).await {
        Ok(rx) => rx,
        Err(e) => return reject(e),
    };

    if wants_stream {
        sse::build_sse_response(events, model, is_video)
    } else {
        match sse::collect_completion(events, &model, is_video).await {
            Ok(completion) => Json(completion).into_response(),
            Err(e) => error_response(StatusCode::BAD_GATEWAY, &e.to_string()),
        }
    }
}

pub async fn list_models() -> Json<ModelList> {
    let data = catalog::all_models()
        .map(|spec| ModelEntry {
            id: spec.id.to_string(),
            object: "model".to_string(),
            owned_by: "flowgate".to_string(),
            description: Some(spec.description.to_string()),
        })
        .collect();
    Json(ModelList { object: "list".to_string(), data })
}

/// Map pre-stream failures onto HTTP statuses: admission pressure is
/// retryable 503, catalog/validation problems are the client's 400.
fn reject(err: TypedError) -> Response {
    match &err {
        TypedError::Admission(AdmissionError::NoCapacity { .. }) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, &err.to_string())
        },
        TypedError::Admission(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, &err.to_string())
        },
        TypedError::Job(JobError::UnsupportedModel { .. })
        | TypedError::Job(JobError::InvalidRequest { .. }) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        },
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "message": message,
            "type": if status.is_client_error() { "invalid_request_error" } else { "server_error" },
        }
    });
    (status, Json(body)).into_response()
}

/// Extract prompt and reference images from the last user message.
fn to_generation_request(
    request: &ChatCompletionRequest,
) -> Result<GenerationRequest, JobError> {
    catalog::lookup(&request.model)
        .ok_or_else(|| JobError::UnsupportedModel { model: request.model.clone() })?;

    let message = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == OpenAIRole::User)
        .ok_or_else(|| JobError::InvalidRequest {
            message: "request contains no user message".to_string(),
        })?;

    let mut prompt_parts: Vec<&str> = Vec::new();
    let mut images: Vec<ReferenceImage> = Vec::new();
    match &message.content {
        OpenAIContent::Text(text) => prompt_parts.push(text),
        OpenAIContent::Parts(parts) => {
            for part in parts {
                match part {
                    OpenAIContentPart::Text { text } => prompt_parts.push(text),
                    OpenAIContentPart::ImageUrl { image_url } => {
                        images.push(decode_data_url(&image_url.url)?);
                    },
                }
            }
        },
    }

    let prompt = prompt_parts.join(" ").trim().to_string();
    if prompt.is_empty() {
        return Err(JobError::InvalidRequest { message: "prompt is empty".to_string() });
    }

    Ok(GenerationRequest { model: request.model.clone(), prompt, images })
}

fn decode_data_url(url: &str) -> Result<ReferenceImage, JobError> {
    let captures = data_url_regex().captures(url).ok_or_else(|| JobError::InvalidRequest {
        message: "image_url must be a base64 image data URL".to_string(),
    })?;
    let bytes = BASE64
        .decode(captures["payload"].as_bytes())
        .map_err(|e| JobError::InvalidRequest { message: format!("invalid image base64: {e}") })?;
    Ok(ReferenceImage { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_types::protocol::openai::{OpenAIImageUrl, OpenAIMessage};

    fn text_message(role: OpenAIRole, text: &str) -> OpenAIMessage {
        OpenAIMessage { role, content: OpenAIContent::Text(text.to_string()) }
    }

    #[test]
    fn test_prompt_from_last_user_message() {
        let request = ChatCompletionRequest {
            model: "gemini-2.5-flash-image-landscape".to_string(),
            messages: vec![
                text_message(OpenAIRole::System, "you are a renderer"),
                text_message(OpenAIRole::User, "first prompt"),
                text_message(OpenAIRole::Assistant, "ok"),
                text_message(OpenAIRole::User, "a lighthouse at dusk"),
            ],
            stream: true,
        };

        let generation = to_generation_request(&request).unwrap();
        assert_eq!(generation.prompt, "a lighthouse at dusk");
        assert!(generation.images.is_empty());
    }

    #[test]
    fn test_multimodal_parts_decode_images() {
        let png = BASE64.encode([0x89, 0x50, 0x4e, 0x47]);
        let request = ChatCompletionRequest {
            model: "veo_2_0_i2v_portrait".to_string(),
            messages: vec![OpenAIMessage {
                role: OpenAIRole::User,
                content: OpenAIContent::Parts(vec![
                    OpenAIContentPart::Text { text: "animate".to_string() },
                    OpenAIContentPart::ImageUrl {
                        image_url: OpenAIImageUrl { url: format!("data:image/png;base64,{png}") },
                    },
                ]),
            }],
            stream: true,
        };

        let generation = to_generation_request(&request).unwrap();
        assert_eq!(generation.prompt, "animate");
        assert_eq!(generation.images.len(), 1);
        assert_eq!(generation.images[0].bytes, vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[test]
    fn test_remote_image_url_rejected() {
        let request = ChatCompletionRequest {
            model: "veo_2_0_i2v_portrait".to_string(),
            messages: vec![OpenAIMessage {
                role: OpenAIRole::User,
                content: OpenAIContent::Parts(vec![
                    OpenAIContentPart::Text { text: "animate".to_string() },
                    OpenAIContentPart::ImageUrl {
                        image_url: OpenAIImageUrl {
                            url: "https://example.com/cat.png".to_string(),
                        },
                    },
                ]),
            }],
            stream: false,
        };

        let err = to_generation_request(&request).unwrap_err();
        assert!(matches!(err, JobError::InvalidRequest { .. }));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let request = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![text_message(OpenAIRole::User, "hi")],
            stream: false,
        };
        let err = to_generation_request(&request).unwrap_err();
        assert!(matches!(err, JobError::UnsupportedModel { .. }));
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let request = ChatCompletionRequest {
            model: "gemini-2.5-flash-image-landscape".to_string(),
            messages: vec![text_message(OpenAIRole::User, "   ")],
            stream: false,
        };
        let err = to_generation_request(&request).unwrap_err();
        assert!(matches!(err, JobError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_model_listing_covers_catalog() {
        let Json(list) = list_models().await;
        assert_eq!(list.object, "list");
        assert_eq!(list.data.len(), catalog::all_models().count());
        assert!(list.data.iter().any(|m| m.id == "veo_3_0_r2v_fast_landscape"));
    }
}
