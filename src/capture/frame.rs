//! 캡처 프레임 소스와 틱 전달

use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tokio::sync::mpsc;

/// 스케줄러가 주기마다 만드는 캡처 단위. 저장하지 않고 바로 업로드 단계로 넘긴다.
#[derive(Debug, Clone)]
pub struct CaptureTick {
    pub seq: u64,
    pub captured_at: SystemTime,
    pub frame: Bytes,
}

/// 틱마다 프레임 하나를 내놓는 쪽. 준비된 프레임이 없으면 `None`.
pub trait FrameSource: Send + Sync + 'static {
    fn capture(&self) -> Option<Bytes>;
}

/// 틱을 받는 쪽. 스케줄러를 막으면 안 되므로 동기 호출이고 바로 반환해야 한다.
pub trait TickSink: Send + Sync + 'static {
    fn on_tick(&self, tick: CaptureTick);
}

impl TickSink for mpsc::UnboundedSender<CaptureTick> {
    fn on_tick(&self, tick: CaptureTick) {
        let _ = self.send(tick);
    }
}

/// candidate가 웹소켓 바이너리로 보내는 최신 스냅샷 하나만 보관
///
/// 캡처 시 꺼내가므로 같은 프레임이 두 번 올라가지 않는다.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Bytes>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Bytes) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }
}

impl FrameSource for LatestFrame {
    fn capture(&self) -> Option<Bytes> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}
