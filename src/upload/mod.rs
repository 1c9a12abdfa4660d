//! 프레임 업로드 파이프라인
//!
//! 프로세스 전체에서 하나를 공유한다. 큐는 유한하고 동시 업로드 수는 워커 수로 묶인다.
//! 큐가 차면 새 프레임은 버린다 (프레임은 버퍼링할 만큼 귀하지 않다).

use crate::artifact::Resolution;
use crate::backend::{ObjectStore, JPEG_CONTENT_TYPE};
use crate::capture::CaptureTick;
use crate::config::UploadConfig;
use crate::error::CoordinatorError;
use crate::retry::{retry, RetryError, RetryPolicy};
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// 업로드 카운터
#[derive(Debug, Default)]
pub struct UploadStats {
    submitted: AtomicU64,
    uploaded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadCounters {
    pub submitted: u64,
    pub uploaded: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl UploadStats {
    pub fn snapshot(&self) -> UploadCounters {
        UploadCounters {
            submitted: self.submitted.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// 한 방에서 업로드에 성공한 URL 목록
#[derive(Debug, Clone, Default)]
pub struct UploadLedger {
    urls: Arc<Mutex<Vec<String>>>,
}

impl UploadLedger {
    pub fn push(&self, url: String) {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 프로세스 전역 단조 증가 밀리초 타임스탬프
///
/// 같은 밀리초에 여러 틱이 와도, 재접속으로 스케줄러가 겹쳐도 키가 겹치지 않는다.
#[derive(Debug, Default)]
pub struct ObjectKeyClock {
    last: AtomicU64,
}

impl ObjectKeyClock {
    pub fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

pub fn object_key(artifact_id: &str, interview_id: &str, timestamp_ms: u64) -> String {
    format!("interviews/{artifact_id}/interview-{interview_id}-{timestamp_ms}.jpg")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 아티팩트가 아직 조회 중
    ArtifactPending,
    ArtifactUnresolved,
    QueueFull,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued { key: String },
    Dropped(DropReason),
}

/// 제출하는 쪽(방)의 문맥
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub interview_id: String,
    pub cancel: CancellationToken,
    pub ledger: UploadLedger,
}

struct UploadJob {
    key: String,
    frame: Bytes,
    cancel: CancellationToken,
    ledger: UploadLedger,
}

#[derive(Clone)]
pub struct UploadPipeline {
    queue: mpsc::Sender<UploadJob>,
    stats: Arc<UploadStats>,
    keys: Arc<ObjectKeyClock>,
}

impl UploadPipeline {
    pub fn spawn(
        store: Arc<dyn ObjectStore>,
        config: &UploadConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(UploadStats::default());
        let policy = RetryPolicy::exponential(config.max_attempts, config.backoff());
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));

        tokio::spawn(dispatch(rx, store, policy, workers, stats.clone(), shutdown));

        Self {
            queue,
            stats,
            keys: Arc::new(ObjectKeyClock::default()),
        }
    }

    /// 업로드 예약. 절대 기다리지 않는다.
    ///
    /// 아티팩트가 확정되지 않았으면 (조회 중이든 포기했든) 프레임은 버린다.
    pub fn submit(
        &self,
        tick: CaptureTick,
        artifact: &Resolution,
        ctx: &UploadContext,
    ) -> SubmitOutcome {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let outcome = self.enqueue(tick, artifact, ctx);
        if let SubmitOutcome::Dropped(reason) = &outcome {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(interview_id = %ctx.interview_id, reason = ?reason, "Frame dropped");
        }
        outcome
    }

    fn enqueue(&self, tick: CaptureTick, artifact: &Resolution, ctx: &UploadContext) -> SubmitOutcome {
        if ctx.cancel.is_cancelled() {
            return SubmitOutcome::Dropped(DropReason::Cancelled);
        }
        let handle = match artifact {
            Resolution::Resolved(handle) => handle,
            Resolution::Pending => return SubmitOutcome::Dropped(DropReason::ArtifactPending),
            Resolution::Unresolved => {
                return SubmitOutcome::Dropped(DropReason::ArtifactUnresolved)
            }
        };

        let key = object_key(&handle.artifact_id, &ctx.interview_id, self.keys.next());
        let job = UploadJob {
            key: key.clone(),
            frame: tick.frame,
            cancel: ctx.cancel.clone(),
            ledger: ctx.ledger.clone(),
        };
        match self.queue.try_send(job) {
            Ok(()) => SubmitOutcome::Queued { key },
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(interview_id = %ctx.interview_id, "Upload queue full, frame dropped");
                SubmitOutcome::Dropped(DropReason::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                SubmitOutcome::Dropped(DropReason::Cancelled)
            }
        }
    }

    pub fn stats(&self) -> UploadCounters {
        self.stats.snapshot()
    }
}

async fn dispatch(
    mut queue: mpsc::Receiver<UploadJob>,
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    workers: Arc<Semaphore>,
    stats: Arc<UploadStats>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = workers.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let store = store.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            upload_frame(store, &policy, job, &stats).await;
            drop(permit);
        });
    }
    tracing::debug!("Upload dispatcher stopped");
}

async fn upload_frame(
    store: Arc<dyn ObjectStore>,
    policy: &RetryPolicy,
    job: UploadJob,
    stats: &UploadStats,
) {
    let result = retry(policy, &job.cancel, |attempt| {
        let store = store.clone();
        let key = job.key.clone();
        let frame = job.frame.clone();
        async move {
            tracing::debug!(key = %key, attempt, "Uploading frame");
            store.put_object(&key, frame, JPEG_CONTENT_TYPE).await
        }
    })
    .await;

    match result {
        Ok(url) => {
            stats.uploaded.fetch_add(1, Ordering::Relaxed);
            tracing::info!(key = %job.key, url = %url, "Frame uploaded");
            job.ledger.push(url);
        }
        Err(RetryError::Exhausted { attempts, last }) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                error = %CoordinatorError::UploadFailed { key: job.key.clone(), attempts },
                cause = %last,
                "Frame dropped after retries"
            );
        }
        Err(RetryError::Cancelled) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %job.key, "Upload cancelled");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifact::ArtifactHandle;
    use crate::backend::BackendError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// 앞의 `failures`번은 실패하는 가짜 스토어
    pub(crate) struct FlakyObjectStore {
        failures: u32,
        pub attempts: AtomicU32,
        pub keys: Mutex<Vec<String>>,
    }

    impl FlakyObjectStore {
        pub fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                keys: Mutex::new(Vec::new()),
            }
        }

        pub fn stored_keys(&self) -> Vec<String> {
            self.keys.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyObjectStore {
        async fn put_object(
            &self,
            key: &str,
            _body: Bytes,
            _content_type: &str,
        ) -> Result<String, BackendError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(BackendError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.keys.lock().unwrap().push(key.to_string());
            Ok(format!("https://cdn.test/{key}"))
        }
    }

    /// 호출마다 1초 걸리고 동시에 몇 개가 돌았는지 기록하는 스토어
    struct SlowObjectStore {
        in_flight: AtomicU32,
        peak: AtomicU32,
    }

    #[async_trait]
    impl ObjectStore for SlowObjectStore {
        async fn put_object(
            &self,
            key: &str,
            _body: Bytes,
            _content_type: &str,
        ) -> Result<String, BackendError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("https://cdn.test/{key}"))
        }
    }

    fn config() -> UploadConfig {
        UploadConfig {
            max_attempts: 3,
            backoff_ms: 500,
            workers: 4,
            queue_capacity: 8,
        }
    }

    fn tick(seq: u64) -> CaptureTick {
        CaptureTick {
            seq,
            captured_at: SystemTime::now(),
            frame: Bytes::from_static(b"jpeg"),
        }
    }

    fn resolved() -> Resolution {
        Resolution::Resolved(ArtifactHandle {
            interview_id: "R1".to_string(),
            artifact_id: "a1".to_string(),
        })
    }

    fn context() -> UploadContext {
        UploadContext {
            interview_id: "R1".to_string(),
            cancel: CancellationToken::new(),
            ledger: UploadLedger::default(),
        }
    }

    #[test]
    fn test_key_clock_is_strictly_increasing() {
        let clock = ObjectKeyClock::default();
        let stamps: Vec<u64> = (0..100).map(|_| clock.next()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_artifact_drops_frames() {
        let store = Arc::new(FlakyObjectStore::new(0));
        let pipeline = UploadPipeline::spawn(store.clone(), &config(), CancellationToken::new());
        let ctx = context();

        assert_eq!(
            pipeline.submit(tick(0), &Resolution::Pending, &ctx),
            SubmitOutcome::Dropped(DropReason::ArtifactPending)
        );
        assert_eq!(
            pipeline.submit(tick(1), &Resolution::Unresolved, &ctx),
            SubmitOutcome::Dropped(DropReason::ArtifactUnresolved)
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.stats().dropped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_uploads() {
        let store = Arc::new(FlakyObjectStore::new(2));
        let pipeline = UploadPipeline::spawn(store.clone(), &config(), CancellationToken::new());
        let ctx = context();

        let outcome = pipeline.submit(tick(0), &resolved(), &ctx);
        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        let counters = pipeline.stats();
        assert_eq!((counters.uploaded, counters.failed), (1, 0));
        assert_eq!(ctx.ledger.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_frame_counts_one_failure() {
        let store = Arc::new(FlakyObjectStore::new(u32::MAX));
        let pipeline = UploadPipeline::spawn(store.clone(), &config(), CancellationToken::new());
        let ctx = context();

        pipeline.submit(tick(0), &resolved(), &ctx);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
        let counters = pipeline.stats();
        assert_eq!((counters.uploaded, counters.failed), (0, 1));
        assert!(ctx.ledger.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_unique_across_submissions() {
        let store = Arc::new(FlakyObjectStore::new(0));
        let pipeline = UploadPipeline::spawn(store.clone(), &config(), CancellationToken::new());
        let first = context();
        let duplicate = context();

        for seq in 0..4 {
            pipeline.submit(tick(seq), &resolved(), &first);
            pipeline.submit(tick(seq), &resolved(), &duplicate);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let keys = store.stored_keys();
        assert_eq!(keys.len(), 8);
        assert_eq!(keys.iter().collect::<HashSet<_>>().len(), 8);
        assert!(keys.iter().all(|k| k.starts_with("interviews/a1/interview-R1-")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full_drops_instead_of_growing() {
        let store = Arc::new(FlakyObjectStore::new(0));
        let mut config = config();
        config.queue_capacity = 2;
        let pipeline = UploadPipeline::spawn(store, &config, CancellationToken::new());
        let ctx = context();

        // 디스패처가 돌기 전에 몰아서 넣으면 큐 용량을 넘는다
        let outcomes: Vec<_> = (0..3)
            .map(|seq| pipeline.submit(tick(seq), &resolved(), &ctx))
            .collect();

        assert!(matches!(outcomes[0], SubmitOutcome::Queued { .. }));
        assert!(matches!(outcomes[1], SubmitOutcome::Queued { .. }));
        assert_eq!(outcomes[2], SubmitOutcome::Dropped(DropReason::QueueFull));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_room_abandons_retries() {
        let store = Arc::new(FlakyObjectStore::new(u32::MAX));
        let pipeline = UploadPipeline::spawn(store.clone(), &config(), CancellationToken::new());
        let ctx = context();

        pipeline.submit(tick(0), &resolved(), &ctx);
        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx.cancel.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
        let counters = pipeline.stats();
        assert_eq!((counters.failed, counters.dropped), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_uploads_bounded_by_workers() {
        let store = Arc::new(SlowObjectStore {
            in_flight: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        });
        let mut config = config();
        config.queue_capacity = 32;
        let pipeline = UploadPipeline::spawn(store.clone(), &config, CancellationToken::new());
        let ctx = context();

        for seq in 0..20 {
            assert!(matches!(
                pipeline.submit(tick(seq), &resolved(), &ctx),
                SubmitOutcome::Queued { .. }
            ));
        }
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(store.peak.load(Ordering::SeqCst), config.workers as u32);
        assert_eq!(pipeline.stats().uploaded, 20);
        assert_eq!(ctx.ledger.snapshot().len(), 20);
    }
}
