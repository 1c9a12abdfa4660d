//! 아티팩트 식별자 조회
//!
//! 아티팩트 행은 백엔드가 비동기로 만든다. 캡처가 시작될 때 아직 없을 수 있어서
//! 정해진 간격으로 정해진 횟수만큼만 폴링하고, 결과는 방이 살아있는 동안 캐시한다.

use crate::backend::{ArtifactStore, BackendError};
use crate::error::CoordinatorError;
use crate::retry::{retry, RetryError, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub interview_id: String,
    pub artifact_id: String,
}

/// 조회 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    Resolved(ArtifactHandle),
    /// 재시도 예산을 다 썼거나 취소됨. 이후 프레임은 버린다.
    Unresolved,
}

impl Resolution {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Resolution::Pending)
    }
}

enum LookupMiss {
    NotCreated,
    Backend(BackendError),
}

impl fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupMiss::NotCreated => f.write_str("artifact row not created yet"),
            LookupMiss::Backend(e) => write!(f, "{e}"),
        }
    }
}

/// 복제 가능한 조회 핸들. 실제 폴링은 `spawn`이 띄운 태스크 하나만 한다.
#[derive(Clone)]
pub struct ArtifactResolver {
    state: watch::Receiver<Resolution>,
}

impl ArtifactResolver {
    pub fn spawn(
        interview_id: impl Into<String>,
        store: Arc<dyn ArtifactStore>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        let interview_id = interview_id.into();
        let (tx, rx) = watch::channel(Resolution::Pending);

        tokio::spawn(async move {
            let resolution = poll_artifact(&interview_id, store, &policy, &cancel).await;
            let _ = tx.send(resolution);
        });

        Self { state: rx }
    }

    /// 기다리지 않고 현재 상태 반환
    pub fn current(&self) -> Resolution {
        self.state.borrow().clone()
    }

    /// 결론이 날 때까지 대기. 폴링 예산이 유한하므로 무한 대기는 없다.
    pub async fn resolve(&self) -> Resolution {
        let mut state = self.state.clone();
        let resolution = match state.wait_for(Resolution::is_settled).await {
            Ok(resolution) => resolution.clone(),
            Err(_) => Resolution::Unresolved,
        };
        resolution
    }
}

async fn poll_artifact(
    interview_id: &str,
    store: Arc<dyn ArtifactStore>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Resolution {
    let result = retry(policy, cancel, |attempt| {
        let store = store.clone();
        async move {
            tracing::debug!(interview_id = %interview_id, attempt, "Polling for artifact");
            match store.find_artifact_id(interview_id).await {
                Ok(Some(artifact_id)) => Ok(artifact_id),
                Ok(None) => Err(LookupMiss::NotCreated),
                Err(e) => Err(LookupMiss::Backend(e)),
            }
        }
    })
    .await;

    match result {
        Ok(artifact_id) => {
            tracing::info!(
                interview_id = %interview_id,
                artifact_id = %artifact_id,
                "Artifact resolved"
            );
            Resolution::Resolved(ArtifactHandle {
                interview_id: interview_id.to_string(),
                artifact_id,
            })
        }
        Err(RetryError::Exhausted { attempts, last }) => {
            tracing::warn!(
                interview_id = %interview_id,
                attempts,
                last_error = %last,
                error = %CoordinatorError::ArtifactUnresolved(interview_id.to_string()),
                "Artifact resolution gave up; frames will be dropped"
            );
            Resolution::Unresolved
        }
        Err(RetryError::Cancelled) => {
            tracing::debug!(interview_id = %interview_id, "Artifact resolution cancelled");
            Resolution::Unresolved
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// `appears_on`번째 조회부터 아티팩트가 보이는 가짜 스토어
    pub(crate) struct DelayedArtifactStore {
        pub appears_on: Option<u32>,
        pub lookups: AtomicU32,
        pub recorded: std::sync::Mutex<Vec<(String, Vec<String>)>>,
    }

    impl DelayedArtifactStore {
        pub fn new(appears_on: Option<u32>) -> Self {
            Self {
                appears_on,
                lookups: AtomicU32::new(0),
                recorded: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ArtifactStore for DelayedArtifactStore {
        async fn find_artifact_id(
            &self,
            _interview_id: &str,
        ) -> Result<Option<String>, BackendError> {
            let lookup = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(match self.appears_on {
                Some(n) if lookup >= n => Some("artifact-1".to_string()),
                _ => None,
            })
        }

        async fn record_image_urls(
            &self,
            artifact_id: &str,
            urls: &[String],
        ) -> Result<(), BackendError> {
            self.recorded
                .lock()
                .unwrap()
                .push((artifact_id.to_string(), urls.to_vec()));
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(10, Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_on_sixth_attempt() {
        let store = Arc::new(DelayedArtifactStore::new(Some(6)));
        let started = Instant::now();
        let resolver =
            ArtifactResolver::spawn("R1", store.clone(), policy(), CancellationToken::new());

        assert_eq!(resolver.current(), Resolution::Pending);
        let resolution = resolver.resolve().await;

        assert_eq!(
            resolution,
            Resolution::Resolved(ArtifactHandle {
                interview_id: "R1".to_string(),
                artifact_id: "artifact-1".to_string(),
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 6);

        // 캐시된 결과는 더 이상 조회하지 않는다
        assert_eq!(resolver.clone().resolve().await, resolution);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let store = Arc::new(DelayedArtifactStore::new(None));
        let resolver =
            ArtifactResolver::spawn("R1", store.clone(), policy(), CancellationToken::new());

        assert_eq!(resolver.resolve().await, Resolution::Unresolved);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let store = Arc::new(DelayedArtifactStore::new(None));
        let cancel = CancellationToken::new();
        let resolver = ArtifactResolver::spawn("R1", store.clone(), policy(), cancel.clone());

        tokio::time::sleep(Duration::from_millis(3000)).await;
        cancel.cancel();

        assert_eq!(resolver.resolve().await, Resolution::Unresolved);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }
}
