//! 참가자별 피어 세션 상태 머신
//!
//! ```text
//! candidate: idle -join-> joined -local offer-> offer_sent -remote answer-> connected
//! recruiter: idle -join-> joined -remote offer-> offer_received -local answer-> answer_sent -accepted-> connected
//! any live state -transport lost-> disconnected -reconnect-> joined
//! any state -fail/leave-> ended -renegotiate-> joined
//! ```
//!
//! 오퍼는 항상 candidate 쪽에서만 시작한다. recruiter는 보기만 하는 쪽이라
//! `offer_sent`를 거치지 않는다.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 인터뷰 참가자 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Candidate,
    Recruiter,
}

impl Role {
    /// 같은 방의 상대 역할
    pub fn peer(self) -> Role {
        match self {
            Role::Candidate => Role::Recruiter,
            Role::Recruiter => Role::Candidate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Candidate => "candidate",
            Role::Recruiter => "recruiter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 참가자 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Joined,
    OfferSent,
    OfferReceived,
    AnswerSent,
    Connected,
    Disconnected,
    Ended,
}

impl SessionState {
    /// 협상 중 (ICE 타임아웃 감시 대상)
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            SessionState::OfferSent | SessionState::OfferReceived | SessionState::AnswerSent
        )
    }
}

/// 상태 머신 입력
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Join,
    LocalOffer,
    RemoteOffer,
    LocalAnswer,
    AnswerAccepted,
    RemoteAnswer,
    /// 상대가 빠지거나 재접속해서 협상을 처음부터 다시 해야 할 때
    Reset,
    TransportLost,
    Reconnect,
    /// ICE 실패
    Fail,
    Renegotiate,
    Leave,
}

/// 한 연결의 세션
#[derive(Debug, Clone)]
pub struct PeerSession {
    role: Role,
    user_id: String,
    state: SessionState,
}

impl PeerSession {
    pub fn new(role: Role, user_id: impl Into<String>) -> Self {
        Self {
            role,
            user_id: user_id.into(),
            state: SessionState::Idle,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = user_id.into();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 전이 적용. 실패하면 상태는 그대로 유지된다.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionState, SessionError> {
        let next = self.next_state(event)?;
        self.state = next;
        Ok(next)
    }

    fn next_state(&self, event: SessionEvent) -> Result<SessionState, SessionError> {
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self.state, event) {
            (S::Idle, E::Join) => S::Joined,

            (S::Joined, E::LocalOffer) if self.role == Role::Candidate => S::OfferSent,
            (_, E::LocalOffer) if self.role == Role::Recruiter => {
                return Err(SessionError::RecruiterCannotOffer)
            }
            (S::OfferSent, E::RemoteAnswer) => S::Connected,

            (S::Joined, E::RemoteOffer) if self.role == Role::Recruiter => S::OfferReceived,
            (S::OfferReceived, E::LocalAnswer) => S::AnswerSent,
            (S::AnswerSent, E::AnswerAccepted) => S::Connected,

            (
                S::Joined | S::OfferSent | S::OfferReceived | S::AnswerSent | S::Connected,
                E::Reset,
            ) => S::Joined,

            (
                S::Idle
                | S::Joined
                | S::OfferSent
                | S::OfferReceived
                | S::AnswerSent
                | S::Connected,
                E::TransportLost,
            ) => S::Disconnected,
            (S::Disconnected, E::Reconnect) => S::Joined,

            (state, E::Fail) if state != S::Ended => S::Ended,
            (S::Ended, E::Renegotiate) => S::Joined,
            (_, E::Leave) => S::Ended,

            (state, event) => {
                return Err(SessionError::InvalidTransition {
                    role: self.role,
                    state,
                    event,
                })
            }
        };
        Ok(next)
    }
}
