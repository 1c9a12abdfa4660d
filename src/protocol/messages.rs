//! 클라이언트-서버 메시지 프로토콜 정의
//!
//! `{"type": "webrtc-offer", "payload": {"interviewId": "...", "sdp": {...}}}`

use crate::session::{Role, SessionState};
use serde::{Deserialize, Serialize};

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    // Connection
    Heartbeat,

    // Interview Room
    JoinInterviewCandidate {
        interview_id: String,
        candidate_id: String,
    },
    JoinInterviewRecruiter {
        interview_id: String,
        recruiter_id: String,
    },
    LeaveInterview {
        interview_id: String,
    },
    InterviewStatusUpdate {
        interview_id: String,
        status: String,
    },

    // WebRTC Signaling (sdp/candidate는 그대로 중계)
    WebrtcOffer {
        interview_id: String,
        sdp: serde_json::Value,
    },
    WebrtcAnswer {
        interview_id: String,
        sdp: serde_json::Value,
    },
    WebrtcIceCandidate {
        interview_id: String,
        candidate: serde_json::Value,
    },
    WebrtcConnectionFailed {
        interview_id: String,
    },

    // ICE servers
    RequestIceConfig {
        interview_id: String,
    },
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    // Connection
    Connected { socket_id: String },
    HeartbeatAck,
    Error { code: String, message: String },

    // Room Events
    JoinedInterview {
        interview_id: String,
        role: Role,
        state: SessionState,
    },
    /// recruiter에게: candidate가 있으니 오퍼를 기다려라
    CandidateAvailable { interview_id: String },
    /// candidate에게: recruiter가 들어왔으니 오퍼를 만들어라
    RecruiterWantsToWatch {
        interview_id: String,
        recruiter_id: String,
    },
    CandidateJoined {
        interview_id: String,
        candidate_id: String,
    },
    CandidateLeft { interview_id: String },
    RecruiterLeft { interview_id: String },
    SessionReplaced { interview_id: String },
    SessionState {
        interview_id: String,
        state: SessionState,
    },
    ConnectionFailed {
        interview_id: String,
        reason: String,
    },
    InterviewStatusChanged {
        interview_id: String,
        status: String,
    },

    // WebRTC Signaling
    WebrtcOffer {
        interview_id: String,
        sdp: serde_json::Value,
    },
    WebrtcAnswer {
        interview_id: String,
        sdp: serde_json::Value,
    },
    WebrtcIceCandidate {
        interview_id: String,
        candidate: serde_json::Value,
    },

    // ICE servers
    IceConfig {
        interview_id: String,
        ice_servers: Vec<IceServer>,
        ttl: u64,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// ICE 서버 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_candidate_join() {
        let raw = json!({
            "type": "join-interview-candidate",
            "payload": { "interviewId": "R1", "candidateId": "c-7" }
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::JoinInterviewCandidate { ref interview_id, ref candidate_id }
                if interview_id == "R1" && candidate_id == "c-7"
        ));
    }

    #[test]
    fn test_parse_heartbeat_without_payload() {
        let msg: ClientMessage = serde_json::from_value(json!({ "type": "heartbeat" })).unwrap();
        assert!(matches!(msg, ClientMessage::Heartbeat));
    }

    #[test]
    fn test_offer_payload_is_opaque() {
        let sdp = json!({ "type": "offer", "sdp": "v=0\r\n..." });
        let raw = json!({
            "type": "webrtc-offer",
            "payload": { "interviewId": "R1", "sdp": sdp.clone() }
        });
        let ClientMessage::WebrtcOffer { sdp: parsed, .. } = serde_json::from_value(raw).unwrap()
        else {
            panic!("expected offer");
        };
        assert_eq!(parsed, sdp);
    }

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::RecruiterWantsToWatch {
            interview_id: "R1".to_string(),
            recruiter_id: "r-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "recruiter-wants-to-watch",
                "payload": { "interviewId": "R1", "recruiterId": "r-1" }
            })
        );

        let state = ServerMessage::SessionState {
            interview_id: "R1".to_string(),
            state: SessionState::OfferSent,
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap()["payload"]["state"],
            json!("offer_sent")
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = json!({ "type": "join-room", "payload": { "roomId": "x" } });
        assert!(serde_json::from_value::<ClientMessage>(raw).is_err());
    }
}
