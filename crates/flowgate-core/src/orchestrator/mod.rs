//! Job orchestration: one task per job, driving the state machine
//! `Submitted -> Polling -> {PartialResult}* -> Completed | Failed`.
//!
//! Progress flows to the response writer over an mpsc channel; the
//! receiver dropping is the cancellation signal.

pub mod progress;

use crate::config::TuningConfig;
use crate::flow::catalog::{self, MediaFamily, ModelSpec};
use crate::flow::models::ImageInput;
use crate::flow::{FlowAuth, FlowBackend, VideoSubmission};
use crate::select::{AccountSelector, Lease};
use crate::store::CredentialStore;
use flowgate_types::error::{JobError, TypedError};
use flowgate_types::models::{GenerationKind, GenerationRequest, JobState, ProgressPayload};
use self::progress::{PollSource, ProgressDedup, ProgressSource, ProgressStep};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Events delivered to the response writer, in order, at most once each.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Progress(ProgressPayload),
    Completed { urls: Vec<String> },
    Failed(JobError),
}

const EVENT_CHANNEL_DEPTH: usize = 32;
const DEFAULT_PAYGATE_TIER: &str = "PAYGATE_TIER_ONE";

pub struct JobOrchestrator {
    store: Arc<CredentialStore>,
    backend: Arc<dyn FlowBackend>,
    selector: Arc<AccountSelector>,
    tuning: TuningConfig,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<CredentialStore>,
        backend: Arc<dyn FlowBackend>,
        selector: Arc<AccountSelector>,
        tuning: TuningConfig,
    ) -> Self {
        Self { store, backend, selector, tuning }
    }

    /// Validate, admit, and launch one job. Admission and validation
    /// failures are returned here so the boundary can map them to proper
    /// HTTP statuses; everything later arrives on the event channel.
    pub async fn run(
        self: &Arc<Self>,
        request: GenerationRequest,
    ) -> Result<mpsc::Receiver<JobEvent>, TypedError> {
        let spec = catalog::lookup(&request.model)
            .ok_or_else(|| JobError::UnsupportedModel { model: request.model.clone() })?;
        let kind = spec.kind_for(request.images.len());
        validate_image_count(spec, kind, request.images.len())?;

        let lease = self.selector.acquire(kind).await?;
        tracing::info!(
            model = %request.model,
            kind = %kind,
            account_id = %lease.account_id(),
            images = request.images.len(),
            state = ?JobState::Submitted,
            "job admitted"
        );

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.drive(request, spec, kind, lease, tx).await;
        });
        Ok(rx)
    }

    /// Submission loop: on a submission-stage failure, release the
    /// account and retry on a different one, up to `submit_max_accounts`
    /// distinct accounts in total.
    async fn drive(
        &self,
        request: GenerationRequest,
        spec: &'static ModelSpec,
        kind: GenerationKind,
        first_lease: Lease,
        tx: mpsc::Sender<JobEvent>,
    ) {
        let mut attempted: HashSet<String> = HashSet::new();
        let mut lease = Some(first_lease);
        let max_accounts = self.tuning.submit_max_accounts.max(1);

        if spec.family == MediaFamily::TextVideo && !request.images.is_empty() {
            let _ = tx
                .send(JobEvent::Progress(ProgressPayload::Status {
                    text: "reference images are ignored by text-to-video models".to_string(),
                }))
                .await;
        }

        for attempt in 1..=max_accounts {
            let current = match lease.take() {
                Some(l) => l,
                None => match self.selector.acquire_excluding(kind, &attempted).await {
                    Ok(l) => l,
                    Err(e) => {
                        let _ = tx
                            .send(JobEvent::Failed(JobError::Submission {
                                message: e.to_string(),
                            }))
                            .await;
                        return;
                    },
                },
            };
            attempted.insert(current.account_id().to_string());

            match self.run_on_account(&current, spec, kind, &request, &tx).await {
                Ok(urls) => {
                    self.store.record_success(current.account_id());
                    tracing::info!(
                        account_id = %current.account_id(),
                        assets = urls.len(),
                        state = ?JobState::Completed,
                        "job completed"
                    );
                    let _ = tx.send(JobEvent::Completed { urls }).await;
                    return;
                },
                Err(JobError::Cancelled) => {
                    tracing::info!(account_id = %current.account_id(), "job cancelled by client");
                    return;
                },
                Err(e @ JobError::Submission { .. }) if attempt < max_accounts => {
                    tracing::warn!(
                        account_id = %current.account_id(),
                        attempt,
                        error = %e,
                        "submission failed, retrying on another account"
                    );
                    self.store.record_failure(current.account_id());
                    // lease drops here, freeing the slot before reselection
                },
                Err(e) => {
                    if e.is_account_level() {
                        self.store.record_failure(current.account_id());
                    }
                    tracing::warn!(
                        account_id = %current.account_id(),
                        error = %e,
                        state = ?JobState::Failed,
                        "job failed"
                    );
                    let _ = tx.send(JobEvent::Failed(e)).await;
                    return;
                },
            }
        }
    }

    /// One full attempt on one account: auth, uploads, generation,
    /// and (for video) the poll loop.
    async fn run_on_account(
        &self,
        lease: &Lease,
        spec: &'static ModelSpec,
        kind: GenerationKind,
        request: &GenerationRequest,
        tx: &mpsc::Sender<JobEvent>,
    ) -> Result<Vec<String>, JobError> {
        let auth = self.build_auth(lease.account_id()).await?;
        let mut dedup = ProgressDedup::default();

        let wants_images = spec.family != MediaFamily::TextVideo;
        let mut media_ids = Vec::with_capacity(request.images.len());
        if wants_images {
            let total = request.images.len();
            for (i, image) in request.images.iter().enumerate() {
                emit_status(tx, &mut dedup, &format!("uploading reference image {}/{total}", i + 1))
                    .await?;
                let media_id =
                    self.backend.upload_image(&auth, &image.bytes, spec.aspect_ratio).await?;
                media_ids.push(media_id);
            }
        }

        if spec.family == MediaFamily::Image {
            emit_status(tx, &mut dedup, "generating image").await?;
            let timeout = Duration::from_secs(self.tuning.image_idle_timeout_secs.max(1));
            let inputs: Vec<ImageInput> =
                media_ids.into_iter().map(ImageInput::reference).collect();
            return match tokio::time::timeout(
                timeout,
                self.backend.generate_images(&auth, spec, &request.prompt, inputs),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(JobError::Timeout { idle_secs: timeout.as_secs() }),
            };
        }

        let submission = match spec.family {
            MediaFamily::TextVideo => VideoSubmission::Text,
            MediaFamily::FrameVideo => {
                let mut ids = media_ids.into_iter();
                let start = ids.next().ok_or_else(|| JobError::InvalidRequest {
                    message: "frame-driven video requires a start frame".to_string(),
                })?;
                VideoSubmission::Frames { start, end: ids.next() }
            },
            MediaFamily::ReferenceVideo => VideoSubmission::References { media_ids },
            MediaFamily::Image => unreachable!("image family handled above"),
        };

        emit_status(tx, &mut dedup, "submitting video generation").await?;
        let outcome = self.backend.submit_video(&auth, spec, &request.prompt, submission).await?;
        if let Some(credits) = outcome.remaining_credits {
            let _ = self.store.update_credits(lease.account_id(), credits, None);
        }
        tracing::debug!(
            account_id = %lease.account_id(),
            operations = outcome.operations.len(),
            kind = %kind,
            state = ?JobState::Polling,
            "video job submitted"
        );

        let source = PollSource::new(
            self.backend.as_ref(),
            auth,
            outcome.operations,
            Duration::from_secs(self.tuning.poll_interval_secs.max(1)),
            self.tuning.poll_max_failures.max(1),
        );
        let idle = Duration::from_secs(self.tuning.video_idle_timeout_secs.max(1));
        self.poll_until_done(source, idle, tx, &mut dedup).await
    }

    /// Drive a progress source to a terminal state. Checks for client
    /// disconnect and idle expiry between observations, so both take
    /// effect within one poll interval.
    async fn poll_until_done(
        &self,
        mut source: impl ProgressSource,
        idle: Duration,
        tx: &mpsc::Sender<JobEvent>,
        dedup: &mut ProgressDedup,
    ) -> Result<Vec<String>, JobError> {
        let mut last_progress = Instant::now();
        loop {
            if tx.is_closed() {
                source.cancel().await;
                return Err(JobError::Cancelled);
            }
            if last_progress.elapsed() >= idle {
                source.cancel().await;
                return Err(JobError::Timeout { idle_secs: idle.as_secs() });
            }
            match source.next().await {
                ProgressStep::Pending { percent, note } => {
                    let payload = match note {
                        Some(text) => dedup.admit_status(&text),
                        None => dedup.admit_percent(percent),
                    };
                    if let Some(payload) = payload {
                        last_progress = Instant::now();
                        if tx.send(JobEvent::Progress(payload)).await.is_err() {
                            source.cancel().await;
                            return Err(JobError::Cancelled);
                        }
                    }
                },
                ProgressStep::Completed { urls } => return Ok(urls),
                ProgressStep::Failed(e) => return Err(e),
            }
        }
    }

    /// Resolve the account's current auth material, creating the backend
    /// project on first use.
    async fn build_auth(&self, account_id: &str) -> Result<FlowAuth, JobError> {
        let snapshot = self.store.get_snapshot(account_id).ok_or_else(|| {
            JobError::Submission { message: format!("account {account_id} disappeared") }
        })?;
        let access_token = snapshot.access_token.ok_or_else(|| JobError::Submission {
            message: format!("account {account_id} holds no access token"),
        })?;

        let project_id = match snapshot.project_id {
            Some(id) => id,
            None => {
                let session_token = self
                    .store
                    .session_token(account_id)
                    .map_err(|e| JobError::Submission { message: e.to_string() })?;
                let title = format!("flowgate-{account_id}");
                let project_id = self
                    .backend
                    .create_project(&session_token, &title, snapshot.proxy_url.as_deref())
                    .await?;
                let _ = self.store.update_project(account_id, project_id.clone());
                tracing::info!(account_id, project_id = %project_id, "created generation project");
                project_id
            },
        };

        Ok(FlowAuth {
            access_token,
            project_id,
            paygate_tier: snapshot
                .paygate_tier
                .unwrap_or_else(|| DEFAULT_PAYGATE_TIER.to_string()),
            proxy_url: snapshot.proxy_url,
        })
    }
}

fn validate_image_count(
    spec: &ModelSpec,
    kind: GenerationKind,
    count: usize,
) -> Result<(), JobError> {
    // text-to-video tolerates extra images (they are ignored with a
    // warning event), every other family enforces its bounds
    if spec.family == MediaFamily::TextVideo {
        return Ok(());
    }
    let (min, max) = kind.image_bounds();
    if count < min {
        return Err(JobError::InvalidRequest {
            message: format!("{kind} requires at least {min} reference image(s), got {count}"),
        });
    }
    if let Some(max) = max {
        if count > max {
            return Err(JobError::InvalidRequest {
                message: format!("{kind} accepts at most {max} reference image(s), got {count}"),
            });
        }
    }
    Ok(())
}

async fn emit_status(
    tx: &mpsc::Sender<JobEvent>,
    dedup: &mut ProgressDedup,
    text: &str,
) -> Result<(), JobError> {
    if let Some(payload) = dedup.admit_status(text) {
        if tx.send(JobEvent::Progress(payload)).await.is_err() {
            return Err(JobError::Cancelled);
        }
    }
    Ok(())
}
