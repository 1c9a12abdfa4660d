//! 취소 가능한 재시도 프리미티브
//!
//! 아티팩트 폴링(고정 간격)과 업로드 재시도(지수 백오프)가 같이 쓴다.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// 매번 같은 간격
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            multiplier: 1,
        }
    }

    /// 실패할 때마다 두 배
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier: 2,
        }
    }

    /// `attempt`번째 시도(1부터)가 실패한 뒤 기다릴 시간
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_delay.saturating_mul(factor)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("cancelled")]
    Cancelled,
}

/// `op`이 성공하거나, 시도 횟수를 다 쓰거나, 취소될 때까지 반복
///
/// 취소는 시도 직전과 대기 중 모두 확인한다. 진행 중인 시도도 취소되면 드롭된다.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = op(attempt) => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(last) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last,
                })
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, backing off"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
    }

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::fixed(10, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(9), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_later_attempt() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(2));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let result: Result<u32, RetryError<String>> = retry(&policy, &cancel, |attempt| async move {
            if attempt < 3 {
                Err(format!("not yet ({attempt})"))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(3));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), RetryError<&str>> = retry(&policy, &cancel, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err("store rejected") }
        })
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "store rejected");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let policy = RetryPolicy::fixed(10, Duration::from_secs(2));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            retry(&policy, &token, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("missing") }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(4500)).await;
        cancel.cancel();
        let result = task.await.unwrap();

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
