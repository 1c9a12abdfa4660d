//! 코디네이터 에러 정의

use crate::session::{Role, SessionEvent, SessionState};
use std::time::Duration;

/// 방/시그널링/캡처 전 구간에서 쓰는 에러 분류
///
/// 대부분은 소유 컴포넌트 안에서 흡수되고 로그만 남긴다.
/// 사용자에게 노출되는 것은 `RoleOccupied`, `ConnectionFailed` 정도다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("{role} slot is already occupied in interview {interview_id}")]
    RoleOccupied { interview_id: String, role: Role },

    #[error("offer ignored: another offer is still waiting for an answer")]
    GlareIgnored,

    #[error("answer dropped: no outstanding offer")]
    StaleAnswer,

    #[error("{role} is not allowed to send {kind}")]
    WrongDirection { role: Role, kind: &'static str },

    #[error("peer is not present in the room")]
    PeerAbsent,

    #[error("negotiation did not reach connected within {0:?}")]
    IceTimeout(Duration),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("artifact for interview {0} was not created in time")]
    ArtifactUnresolved(String),

    #[error("upload of {key} failed after {attempts} attempts")]
    UploadFailed { key: String, attempts: u32 },

    #[error("transport closed")]
    TransportClosed,

    #[error("interview room {0} is closed")]
    RoomClosed(String),

    #[error("not joined to interview {0}")]
    NotJoined(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CoordinatorError {
    /// 클라이언트에게 내려가는 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoleOccupied { .. } => "role-occupied",
            Self::GlareIgnored => "glare-ignored",
            Self::StaleAnswer => "stale-answer",
            Self::WrongDirection { .. } => "wrong-direction",
            Self::PeerAbsent => "peer-absent",
            Self::IceTimeout(_) => "ice-timeout",
            Self::ConnectionFailed(_) => "connection-failed",
            Self::ArtifactUnresolved(_) => "artifact-unresolved",
            Self::UploadFailed { .. } => "upload-failed",
            Self::TransportClosed => "transport-closed",
            Self::RoomClosed(_) => "room-closed",
            Self::NotJoined(_) => "not-joined",
            Self::Session(_) => "invalid-transition",
        }
    }
}

/// 세션 상태 머신 전이 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{role} cannot apply {event:?} in state {state:?}")]
    InvalidTransition {
        role: Role,
        state: SessionState,
        event: SessionEvent,
    },

    #[error("recruiter never initiates an offer")]
    RecruiterCannotOffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_kebab_case() {
        let errors = [
            CoordinatorError::GlareIgnored,
            CoordinatorError::StaleAnswer,
            CoordinatorError::PeerAbsent,
            CoordinatorError::TransportClosed,
            CoordinatorError::Session(SessionError::RecruiterCannotOffer),
        ];
        for error in errors {
            let code = error.code();
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '-'), "{code}");
        }
    }

    #[test]
    fn test_role_occupied_message() {
        let error = CoordinatorError::RoleOccupied {
            interview_id: "R1".to_string(),
            role: Role::Candidate,
        };
        assert_eq!(
            error.to_string(),
            "candidate slot is already occupied in interview R1"
        );
    }
}
