//! Response writer: job events to OpenAI `chat.completion.chunk` SSE,
//! or collected into a single `chat.completion` for non-stream callers.

use crate::orchestrator::JobEvent;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use flowgate_types::error::{JobError, TerminalReason};
use flowgate_types::models::ProgressPayload;
use flowgate_types::protocol::openai::{
    ChatCompletion, ChatCompletionChunk, ChunkChoice, ChunkDelta, CompletionChoice,
    CompletionMessage,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

fn chunk(id: &str, model: &str, delta: ChunkDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason: finish_reason.map(|s| s.to_string()),
        }],
    }
}

fn sse_frame(chunk: &ChatCompletionChunk) -> Bytes {
    match serde_json::to_string(chunk) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(e) => {
            tracing::error!(error = %e, "chunk serialization failed");
            Bytes::from_static(b"data: {}\n\n")
        },
    }
}

fn progress_text(payload: &ProgressPayload) -> String {
    match payload {
        ProgressPayload::Percent { value } => format!("Generating... {value}%\n"),
        ProgressPayload::Status { text } => format!("{text}\n"),
        ProgressPayload::Preview { url } => format!("Preview: {url}\n"),
    }
}

/// Final assistant content: markdown image embeds or inline video tags.
fn final_content(urls: &[String], is_video: bool) -> String {
    urls.iter()
        .map(|url| {
            if is_video {
                format!("<video src='{url}' controls style='max-width:100%'></video>")
            } else {
                format!("![Generated Image]({url})")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn error_frame(err: &JobError) -> Bytes {
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": "server_error",
        }
    });
    Bytes::from(format!("data: {body}\n\n"))
}

/// Stream job events as SSE. The stream always terminates with
/// `data: [DONE]`, failures included.
pub fn build_sse_response(
    mut events: mpsc::Receiver<JobEvent>,
    model: String,
    is_video: bool,
) -> Response {
    let id = completion_id();
    let stream = async_stream::stream! {
        yield Ok::<Bytes, String>(sse_frame(&chunk(
            &id,
            &model,
            ChunkDelta { role: Some("assistant".to_string()), ..ChunkDelta::default() },
            None,
        )));

        loop {
            match events.recv().await {
                Some(JobEvent::Progress(payload)) => {
                    let delta = ChunkDelta {
                        reasoning_content: Some(progress_text(&payload)),
                        ..ChunkDelta::default()
                    };
                    yield Ok(sse_frame(&chunk(&id, &model, delta, None)));
                },
                Some(JobEvent::Completed { urls }) => {
                    let delta = ChunkDelta {
                        content: Some(final_content(&urls, is_video)),
                        ..ChunkDelta::default()
                    };
                    yield Ok(sse_frame(&chunk(&id, &model, delta, Some("stop"))));
                    break;
                },
                Some(JobEvent::Failed(err)) => {
                    yield Ok(error_frame(&err));
                    break;
                },
                None => break,
            }
        }
        yield Ok(Bytes::from_static(b"data: [DONE]\n\n"));
    };

    let mapped = Box::pin(stream).map(|r: Result<Bytes, String>| r.map_err(std::io::Error::other));
    let body = Body::from_stream(mapped);
    match Response::builder()
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .body(body)
    {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to build streaming response");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

/// Drain the event channel into one `chat.completion`.
pub async fn collect_completion(
    mut events: mpsc::Receiver<JobEvent>,
    model: &str,
    is_video: bool,
) -> Result<ChatCompletion, JobError> {
    loop {
        match events.recv().await {
            Some(JobEvent::Progress(_)) => continue,
            Some(JobEvent::Completed { urls }) => {
                return Ok(ChatCompletion {
                    id: completion_id(),
                    object: "chat.completion".to_string(),
                    created: chrono::Utc::now().timestamp(),
                    model: model.to_string(),
                    choices: vec![CompletionChoice {
                        index: 0,
                        message: CompletionMessage {
                            role: "assistant".to_string(),
                            content: final_content(&urls, is_video),
                        },
                        finish_reason: "stop".to_string(),
                    }],
                });
            },
            Some(JobEvent::Failed(err)) => return Err(err),
            None => {
                return Err(JobError::Terminal {
                    reason: TerminalReason::BackendError,
                    message: "job ended without a terminal event".to_string(),
                });
            },
        }
    }
}
