//! 실시간 면접 세션 코디네이터
//!
//! candidate와 recruiter 사이의 WebRTC 시그널링을 중계하고,
//! 연결된 동안 candidate 화면을 주기적으로 캡처해 오브젝트 스토리지에 올린다.

pub mod artifact;
pub mod backend;
pub mod capture;
pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod retry;
pub mod room;
pub mod server;
pub mod session;
pub mod state;
pub mod upload;
