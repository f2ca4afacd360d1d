//! Progress transport seam and in-order deduplication.
//!
//! The state machine in `mod.rs` consumes `ProgressSource` and never
//! talks to the wire directly, so a push-based transport can replace
//! the poll loop without touching job logic.

use crate::flow::models::{MediaStatus, VideoOperation};
use crate::flow::{FlowAuth, FlowBackend};
use async_trait::async_trait;
use flowgate_types::error::{JobError, TerminalReason};
use flowgate_types::models::ProgressPayload;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// One observation from the backend about a running job.
#[derive(Debug)]
pub enum ProgressStep {
    Pending { percent: u8, note: Option<String> },
    Completed { urls: Vec<String> },
    Failed(JobError),
}

#[async_trait]
pub trait ProgressSource: Send {
    /// Await the next observation. Transient transport errors are the
    /// source's problem; callers only see a `Failed` step once the
    /// source gives up.
    async fn next(&mut self) -> ProgressStep;

    /// Best-effort backend cancellation. The default transport has no
    /// cancel endpoint, so this is a no-op unless a source overrides it.
    async fn cancel(&mut self) {}
}

/// Poll-based transport over `batchCheckAsyncVideoGenerationStatus`.
pub struct PollSource<'a> {
    backend: &'a dyn FlowBackend,
    auth: FlowAuth,
    operations: Vec<VideoOperation>,
    interval: Duration,
    max_failures: u32,
    consecutive_failures: u32,
    polls: u32,
}

impl<'a> PollSource<'a> {
    pub fn new(
        backend: &'a dyn FlowBackend,
        auth: FlowAuth,
        operations: Vec<VideoOperation>,
        interval: Duration,
        max_failures: u32,
    ) -> Self {
        Self {
            backend,
            auth,
            operations,
            interval,
            max_failures,
            consecutive_failures: 0,
            polls: 0,
        }
    }

    /// Synthetic completion estimate; the backend reports no percentage,
    /// only pending/terminal, so progress is inferred from poll count.
    fn estimate(&self) -> u8 {
        (self.polls.saturating_mul(7)).min(95) as u8
    }

    fn classify(&self) -> ProgressStep {
        let mut urls = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            let raw = op.status.as_deref().unwrap_or("");
            match MediaStatus::parse(raw) {
                MediaStatus::Error => {
                    return ProgressStep::Failed(JobError::Terminal {
                        reason: TerminalReason::BackendError,
                        message: format!("generation failed with status {raw}"),
                    });
                },
                MediaStatus::Successful => match op.video_url() {
                    Some(url) => urls.push(url),
                    None => {
                        return ProgressStep::Failed(JobError::Terminal {
                            reason: TerminalReason::BackendError,
                            message: "successful operation carried no asset url".to_string(),
                        });
                    },
                },
                MediaStatus::Pending | MediaStatus::Unknown => {
                    return ProgressStep::Pending { percent: self.estimate(), note: None };
                },
            }
        }
        ProgressStep::Completed { urls }
    }
}

#[async_trait]
impl ProgressSource for PollSource<'_> {
    async fn next(&mut self) -> ProgressStep {
        tokio::time::sleep(self.interval).await;
        self.polls += 1;
        match self.backend.check_video_status(&self.auth, &self.operations).await {
            Ok(updated) => {
                self.consecutive_failures = 0;
                // operation names persist; a poll response supersedes
                // the whole set
                if !updated.is_empty() {
                    self.operations = updated;
                }
                self.classify()
            },
            // a Terminal error from the status check is the job's
            // outcome, not a transport blip; it carries the account-level
            // classification the caller needs
            Err(e @ JobError::Terminal { .. }) => ProgressStep::Failed(e),
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.max_failures {
                    ProgressStep::Failed(JobError::Poll {
                        attempts: self.consecutive_failures,
                        message: e.to_string(),
                    })
                } else {
                    tracing::debug!(
                        failures = self.consecutive_failures,
                        error = %e,
                        "status poll failed, will retry"
                    );
                    // re-emitting the previous estimate is suppressed
                    // by the dedup layer
                    ProgressStep::Pending { percent: self.estimate(), note: None }
                }
            },
        }
    }
}

/// Suppresses duplicate progress before it reaches the event channel.
///
/// Percent markers dedup on value; free-text status lines dedup on a
/// sha2 digest of the text.
#[derive(Default)]
pub struct ProgressDedup {
    last_percent: Option<u8>,
    last_status_digest: Option<[u8; 32]>,
}

impl ProgressDedup {
    pub fn admit_percent(&mut self, value: u8) -> Option<ProgressPayload> {
        if self.last_percent == Some(value) {
            return None;
        }
        self.last_percent = Some(value);
        Some(ProgressPayload::Percent { value })
    }

    pub fn admit_status(&mut self, text: &str) -> Option<ProgressPayload> {
        let digest: [u8; 32] = Sha256::digest(text.as_bytes()).into();
        if self.last_status_digest == Some(digest) {
            return None;
        }
        self.last_status_digest = Some(digest);
        Some(ProgressPayload::Status { text: text.to_string() })
    }
}
