//! Captcha collaborator client (createTask/getTaskResult protocol).
//!
//! Token renewal is gated on a recaptcha v3 token. Solving happens out of
//! process at a collaborator service; we submit a task and poll for the
//! solution, bounded by the configured timeout. The `CaptchaSolver` trait
//! is the seam tests stub.

use crate::config::CaptchaConfig;
use async_trait::async_trait;
use flowgate_types::error::RefreshError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Obtain a recaptcha token for the configured site, or fail within
    /// the collaborator timeout.
    async fn solve(&self) -> Result<String, RefreshError>;
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(rename = "errorId")]
    error_id: i64,
    #[serde(rename = "taskId", default)]
    task_id: Option<String>,
    #[serde(rename = "errorDescription", default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResultResponse {
    #[serde(rename = "errorId")]
    error_id: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<TaskSolution>,
    #[serde(rename = "errorDescription", default)]
    error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskSolution {
    #[serde(rename = "gRecaptchaResponse")]
    g_recaptcha_response: String,
}

/// HTTP client for the collaborator service.
pub struct HttpCaptchaSolver {
    client: reqwest::Client,
    config: CaptchaConfig,
}

impl HttpCaptchaSolver {
    pub fn new(client: reqwest::Client, config: CaptchaConfig) -> Self {
        Self { client, config }
    }

    async fn create_task(&self) -> Result<String, RefreshError> {
        let body = json!({
            "clientKey": self.config.client_key,
            "task": {
                "type": "RecaptchaV3TaskProxylessM1",
                "websiteURL": self.config.website_url,
                "websiteKey": self.config.website_key,
                "pageAction": self.config.page_action,
            }
        });

        let response = self
            .client
            .post(format!("{}/createTask", self.config.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| RefreshError::Network { message: format!("captcha createTask: {}", e) })?;

        let parsed: CreateTaskResponse = response.json().await.map_err(|e| {
            RefreshError::MalformedResponse { message: format!("captcha createTask body: {}", e) }
        })?;

        if parsed.error_id != 0 {
            return Err(RefreshError::CaptchaFailed {
                message: parsed.error_description.unwrap_or_else(|| "task rejected".to_string()),
            });
        }
        parsed.task_id.ok_or_else(|| RefreshError::MalformedResponse {
            message: "captcha createTask returned no taskId".to_string(),
        })
    }

    async fn poll_result(&self, task_id: &str) -> Result<Option<String>, RefreshError> {
        let body = json!({ "clientKey": self.config.client_key, "taskId": task_id });

        let response = self
            .client
            .post(format!("{}/getTaskResult", self.config.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| RefreshError::Network {
                message: format!("captcha getTaskResult: {}", e),
            })?;

        let parsed: TaskResultResponse = response.json().await.map_err(|e| {
            RefreshError::MalformedResponse {
                message: format!("captcha getTaskResult body: {}", e),
            }
        })?;

        if parsed.error_id != 0 {
            return Err(RefreshError::CaptchaFailed {
                message: parsed
                    .error_description
                    .unwrap_or_else(|| "task failed at collaborator".to_string()),
            });
        }

        match parsed.status.as_deref() {
            Some("ready") => {
                let solution = parsed.solution.ok_or_else(|| RefreshError::MalformedResponse {
                    message: "captcha result ready but no solution".to_string(),
                })?;
                Ok(Some(solution.g_recaptcha_response))
            },
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CaptchaSolver for HttpCaptchaSolver {
    async fn solve(&self) -> Result<String, RefreshError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs.max(1));

        let solve_loop = async {
            let task_id = self.create_task().await?;
            tracing::debug!(task_id = %task_id, "captcha task submitted");
            loop {
                tokio::time::sleep(poll_interval).await;
                if let Some(token) = self.poll_result(&task_id).await? {
                    tracing::debug!(task_id = %task_id, "captcha solved");
                    return Ok(token);
                }
            }
        };

        match tokio::time::timeout(timeout, solve_loop).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::CaptchaTimeout { timeout_secs: self.config.timeout_secs }),
        }
    }
}
