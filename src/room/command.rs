//! 방 액터로 들어가는 명령

use crate::error::CoordinatorError;
use crate::protocol::ServerMessage;
use crate::session::{Role, SessionState};
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tokio_util::sync::CancellationToken;

/// 방이 참가자 연결에 대해 가진 핸들
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: String,
    pub sender: UnboundedSender<ServerMessage>,
    /// 같은 역할의 새 연결에 밀려났을 때 취소된다
    pub kick: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(id: impl Into<String>, sender: UnboundedSender<ServerMessage>) -> Self {
        Self {
            id: id.into(),
            sender,
            kick: CancellationToken::new(),
        }
    }

    pub fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message);
    }
}

/// 중계 대상 메시지. 페이로드는 해석하지 않는다.
#[derive(Debug, Clone)]
pub enum Signal {
    Offer(serde_json::Value),
    Answer(serde_json::Value),
    IceCandidate(serde_json::Value),
    /// 연결 이후 클라이언트가 보고한 ICE 실패
    ConnectionFailed,
    StatusUpdate(String),
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::IceCandidate(_) => "ice-candidate",
            Signal::ConnectionFailed => "connection-failed",
            Signal::StatusUpdate(_) => "status-update",
        }
    }
}

#[derive(Debug)]
pub enum RoomCommand {
    Join {
        role: Role,
        user_id: String,
        connection: ConnectionHandle,
        reply: oneshot::Sender<Result<SessionState, CoordinatorError>>,
    },
    /// `connection_id`가 없으면 해당 역할의 현재 연결
    Leave {
        role: Role,
        connection_id: Option<String>,
    },
    TransportClosed {
        role: Role,
        connection_id: String,
    },
    Signal {
        from: Role,
        connection_id: String,
        signal: Signal,
    },
    Frame {
        connection_id: String,
        frame: Bytes,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub user_id: String,
    pub state: SessionState,
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub interview_id: String,
    pub candidate: Option<ParticipantSnapshot>,
    pub recruiter: Option<ParticipantSnapshot>,
    pub status: Option<String>,
    pub renegotiations_left: u32,
    pub capture_running: bool,
}

impl RoomSnapshot {
    pub fn participant(&self, role: Role) -> Option<&ParticipantSnapshot> {
        match role {
            Role::Candidate => self.candidate.as_ref(),
            Role::Recruiter => self.recruiter.as_ref(),
        }
    }
}
