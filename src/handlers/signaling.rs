//! WebRTC 시그널링 핸들러
//!
//! 방향과 순서 판단은 방 액터가 한다. 여기서는 연결이 그 방에 들어가 있는지만 본다.

use super::connection::Connection;
use crate::error::CoordinatorError;
use crate::room::{RoomHandle, Signal};
use crate::session::Role;
use bytes::Bytes;

/// 연결이 해당 면접 방에 들어가 있으면 그 핸들
pub fn joined_room<'a>(
    connection: &'a Connection,
    interview_id: &str,
) -> Result<&'a RoomHandle, CoordinatorError> {
    connection
        .room()
        .filter(|room| room.interview_id == interview_id)
        .ok_or_else(|| CoordinatorError::NotJoined(interview_id.to_string()))
}

async fn relay(connection: &Connection, interview_id: &str, signal: Signal) {
    let kind = signal.kind();
    let result = match joined_room(connection, interview_id) {
        Ok(room) => room.relay(signal).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::debug!(
            connection_id = %connection.id(),
            interview_id = %interview_id,
            kind,
            error = %e,
            "Signal not relayed"
        );
        connection.reject(&e);
    }
}

/// Offer 처리
pub async fn handle_offer(connection: &Connection, interview_id: &str, sdp: serde_json::Value) {
    relay(connection, interview_id, Signal::Offer(sdp)).await;
}

/// Answer 처리
pub async fn handle_answer(connection: &Connection, interview_id: &str, sdp: serde_json::Value) {
    relay(connection, interview_id, Signal::Answer(sdp)).await;
}

/// ICE Candidate 처리
pub async fn handle_ice_candidate(
    connection: &Connection,
    interview_id: &str,
    candidate: serde_json::Value,
) {
    relay(connection, interview_id, Signal::IceCandidate(candidate)).await;
}

/// 클라이언트가 보고한 ICE 연결 실패
pub async fn handle_connection_failed(connection: &Connection, interview_id: &str) {
    relay(connection, interview_id, Signal::ConnectionFailed).await;
}

/// candidate가 보낸 JPEG 스냅샷. 다음 캡처 틱에서 가져간다.
pub fn handle_frame(connection: &Connection, frame: Bytes) {
    let Some(room) = connection.room() else {
        return;
    };
    if room.role != Role::Candidate {
        tracing::debug!(connection_id = %connection.id(), "Frame from recruiter ignored");
        return;
    }
    if let Err(e) = room.publish_frame(frame) {
        tracing::debug!(connection_id = %connection.id(), error = %e, "Frame not published");
    }
}
