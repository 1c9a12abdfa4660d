//! 방 단위 캡처 세션
//!
//! candidate가 `connected`에 들어가면 스케줄러가 돌고, 벗어나면 멈춘다.
//! 아티팩트 조회는 처음 시작할 때 한 번만 띄우고 방이 끝날 때까지 캐시한다.

use crate::artifact::{ArtifactResolver, Resolution};
use crate::backend::ArtifactStore;
use crate::capture::{CaptureScheduler, CaptureTick, LatestFrame, TickSink};
use crate::config::CaptureConfig;
use crate::retry::RetryPolicy;
use crate::upload::{SubmitOutcome, UploadContext, UploadLedger, UploadPipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// 프로세스 전체가 공유하는 캡처 협력자
pub struct CaptureServices {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub uploads: UploadPipeline,
    pub interval: Duration,
    pub artifact_policy: RetryPolicy,
}

impl CaptureServices {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        uploads: UploadPipeline,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            artifacts,
            uploads,
            interval: config.interval(),
            artifact_policy: RetryPolicy::fixed(
                config.artifact_poll_attempts,
                config.artifact_poll_interval(),
            ),
        }
    }
}

/// 틱을 업로드 파이프라인으로 넘기는 싱크
struct FrameUploader {
    pipeline: UploadPipeline,
    resolver: ArtifactResolver,
    ctx: UploadContext,
}

impl TickSink for FrameUploader {
    fn on_tick(&self, tick: CaptureTick) {
        let seq = tick.seq;
        if let SubmitOutcome::Queued { key } =
            self.pipeline.submit(tick, &self.resolver.current(), &self.ctx)
        {
            tracing::debug!(interview_id = %self.ctx.interview_id, seq, key = %key, "Frame queued");
        }
    }
}

pub struct CaptureSession {
    interview_id: String,
    interval: Duration,
    artifacts: Arc<dyn ArtifactStore>,
    resolver: ArtifactResolver,
    scheduler: CaptureScheduler,
    ledger: UploadLedger,
    cancel: CancellationToken,
}

impl CaptureSession {
    pub fn new(
        interview_id: &str,
        services: &CaptureServices,
        frames: LatestFrame,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let resolver = ArtifactResolver::spawn(
            interview_id,
            services.artifacts.clone(),
            services.artifact_policy,
            cancel.clone(),
        );
        let ledger = UploadLedger::default();
        let sink = FrameUploader {
            pipeline: services.uploads.clone(),
            resolver: resolver.clone(),
            ctx: UploadContext {
                interview_id: interview_id.to_string(),
                cancel: cancel.clone(),
                ledger: ledger.clone(),
            },
        };
        let scheduler = CaptureScheduler::new(Arc::new(frames), Arc::new(sink), cancel.clone());

        Self {
            interview_id: interview_id.to_string(),
            interval: services.interval,
            artifacts: services.artifacts.clone(),
            resolver,
            scheduler,
            ledger,
            cancel,
        }
    }

    pub fn start(&mut self) -> bool {
        self.scheduler.start(self.interval)
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// 스케줄러/조회/진행 중 업로드를 모두 취소하고 업로드된 URL을 아티팩트에 기록
    pub async fn finish(mut self) {
        self.scheduler.stop();
        self.cancel.cancel();

        let urls = self.ledger.snapshot();
        let Resolution::Resolved(handle) = self.resolver.current() else {
            return;
        };
        if urls.is_empty() {
            return;
        }

        let persisted = tokio::time::timeout(
            PERSIST_TIMEOUT,
            self.artifacts.record_image_urls(&handle.artifact_id, &urls),
        )
        .await;
        match persisted {
            Ok(Ok(())) => tracing::info!(
                interview_id = %self.interview_id,
                artifact_id = %handle.artifact_id,
                images = urls.len(),
                "Image URLs recorded on artifact"
            ),
            Ok(Err(e)) => tracing::warn!(
                interview_id = %self.interview_id,
                error = %e,
                "Failed to record image URLs"
            ),
            Err(_) => tracing::warn!(
                interview_id = %self.interview_id,
                "Timed out recording image URLs"
            ),
        }
    }
}
