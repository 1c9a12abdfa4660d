//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::room::RoomRegistry;
use crate::upload::UploadPipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 면접 방 (interview_id -> 방 액터)
    pub registry: RoomRegistry,
    /// 캡처가 꺼져 있으면 None
    pub uploads: Option<UploadPipeline>,
    /// 설정
    pub config: Arc<Config>,
    /// 종료 신호. 열린 웹소켓을 모두 끊는다.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        registry: RoomRegistry,
        uploads: Option<UploadPipeline>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            uploads,
            config,
            shutdown,
        }
    }
}
