//! 방 이벤트 스트림 (관측용)

use crate::session::{Role, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Explicit,
    TransportClosed,
    GraceExpired,
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    PeerJoined {
        interview_id: String,
        role: Role,
        user_id: String,
    },
    PeerLeft {
        interview_id: String,
        role: Role,
        reason: LeaveReason,
    },
    StateChanged {
        interview_id: String,
        role: Role,
        state: SessionState,
    },
    GlareIgnored {
        interview_id: String,
    },
    StaleAnswer {
        interview_id: String,
    },
    IceTimeout {
        interview_id: String,
    },
    Renegotiated {
        interview_id: String,
    },
    ConnectionFailed {
        interview_id: String,
    },
    RoomClosed {
        interview_id: String,
    },
}

impl RoomEvent {
    pub fn interview_id(&self) -> &str {
        match self {
            RoomEvent::PeerJoined { interview_id, .. }
            | RoomEvent::PeerLeft { interview_id, .. }
            | RoomEvent::StateChanged { interview_id, .. }
            | RoomEvent::GlareIgnored { interview_id }
            | RoomEvent::StaleAnswer { interview_id }
            | RoomEvent::IceTimeout { interview_id }
            | RoomEvent::Renegotiated { interview_id }
            | RoomEvent::ConnectionFailed { interview_id }
            | RoomEvent::RoomClosed { interview_id } => interview_id,
        }
    }
}
