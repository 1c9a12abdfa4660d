//! 주기 캡처 스케줄러 (candidate 전용)

use super::frame::{CaptureTick, FrameSource, TickSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct Running {
    cancel: CancellationToken,
    /// 틱 전달과 `stop()`을 직렬화한다. false가 된 뒤로는 어떤 틱도 나가지 않는다.
    gate: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

pub struct CaptureScheduler {
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn TickSink>,
    parent: CancellationToken,
    seq: Arc<AtomicU64>,
    running: Option<Running>,
}

impl CaptureScheduler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sink: Arc<dyn TickSink>,
        parent: CancellationToken,
    ) -> Self {
        Self {
            source,
            sink,
            parent,
            seq: Arc::new(AtomicU64::new(0)),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.task.is_finished())
    }

    /// 이미 돌고 있으면 아무것도 하지 않는다. 새로 시작했으면 true.
    pub fn start(&mut self, interval: Duration) -> bool {
        if self.is_running() || self.parent.is_cancelled() {
            return false;
        }
        self.stop();

        let cancel = self.parent.child_token();
        let gate = Arc::new(Mutex::new(true));
        let task = tokio::spawn(run_ticks(
            interval.max(Duration::from_millis(1)),
            self.source.clone(),
            self.sink.clone(),
            self.seq.clone(),
            cancel.clone(),
            gate.clone(),
        ));

        tracing::info!(interval_ms = interval.as_millis() as u64, "Capture scheduler started");
        self.running = Some(Running { cancel, gate, task });
        true
    }

    /// 반환된 시점 이후로는 틱이 절대 전달되지 않는다.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        *running.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
        running.cancel.cancel();
        running.task.abort();
        tracing::info!("Capture scheduler stopped");
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticks(
    interval: Duration,
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn TickSink>,
    seq: Arc<AtomicU64>,
    cancel: CancellationToken,
    gate: Arc<Mutex<bool>>,
) {
    // 첫 틱은 한 주기 뒤
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !deliver_tick(&gate, source.as_ref(), sink.as_ref(), &seq) {
            break;
        }
    }
}

/// 게이트가 닫혔으면 false
fn deliver_tick(
    gate: &Mutex<bool>,
    source: &dyn FrameSource,
    sink: &dyn TickSink,
    seq: &AtomicU64,
) -> bool {
    let active = gate.lock().unwrap_or_else(PoisonError::into_inner);
    if !*active {
        return false;
    }
    match source.capture() {
        Some(frame) => sink.on_tick(CaptureTick {
            seq: seq.fetch_add(1, Ordering::Relaxed),
            captured_at: SystemTime::now(),
            frame,
        }),
        None => tracing::debug!("No frame available, tick skipped"),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    struct StaticFrame;

    impl FrameSource for StaticFrame {
        fn capture(&self) -> Option<Bytes> {
            Some(Bytes::from_static(b"jpeg"))
        }
    }

    fn scheduler() -> (CaptureScheduler, mpsc::UnboundedReceiver<CaptureTick>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler =
            CaptureScheduler::new(Arc::new(StaticFrame), Arc::new(tx), CancellationToken::new());
        (scheduler, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval() {
        let (mut scheduler, mut rx) = scheduler();
        assert!(scheduler.start(Duration::from_millis(2000)));

        let started = Instant::now();
        let first = rx.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
        let second = rx.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(4000));
        assert_eq!((first.seq, second.seq), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_noop() {
        let (mut scheduler, mut rx) = scheduler();
        assert!(scheduler.start(Duration::from_millis(2000)));
        assert!(!scheduler.start(Duration::from_millis(2000)));

        tokio::time::sleep(Duration::from_millis(6500)).await;
        scheduler.stop();

        let mut seqs = Vec::new();
        while let Ok(tick) = rx.try_recv() {
            seqs.push(tick.seq);
        }
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let (mut scheduler, mut rx) = scheduler();
        scheduler.start(Duration::from_millis(2000));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.stop();
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(rx.try_recv().unwrap().seq, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_noop() {
        let (mut scheduler, _rx) = scheduler();
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(scheduler.start(Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut scheduler = CaptureScheduler::new(Arc::new(StaticFrame), Arc::new(tx), parent.clone());
        scheduler.start(Duration::from_millis(1000));

        parent.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(!scheduler.is_running());
    }
}
