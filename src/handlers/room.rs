//! 면접 방 입장/퇴장 핸들러

use super::connection::Connection;
use crate::error::CoordinatorError;
use crate::room::Signal;
use crate::session::Role;
use crate::state::AppState;

/// 방 참여 처리. 다른 방이나 다른 역할로 들어가 있었다면 새 입장이 성공한 뒤에 나온다.
pub async fn handle_join_interview(
    state: &AppState,
    connection: &mut Connection,
    role: Role,
    interview_id: &str,
    user_id: &str,
) {
    let interview_id = interview_id.trim();
    let user_id = user_id.trim();
    if interview_id.is_empty() || user_id.is_empty() {
        connection.send(crate::protocol::ServerMessage::error(
            "bad-message",
            "interviewId and user id are required",
        ));
        return;
    }

    // 같은 자리로 다시 들어오면 자기 자신과 겹치지 않게 먼저 비운다
    let same_slot = connection
        .room()
        .is_some_and(|room| room.interview_id == interview_id && room.role == role);
    if same_slot {
        if let Some(previous) = connection.room.take() {
            let _ = previous.leave().await;
        }
    }

    tracing::info!(
        connection_id = %connection.id(),
        interview_id = %interview_id,
        role = %role,
        user_id = %user_id,
        "Join requested"
    );

    match state
        .registry
        .join(interview_id, role, user_id, connection.handle())
        .await
    {
        Ok(room) => {
            if let Some(previous) = connection.room.replace(room) {
                tracing::info!(
                    connection_id = %connection.id(),
                    interview_id = %previous.interview_id,
                    role = %previous.role,
                    "Leaving previous interview after join"
                );
                let _ = previous.leave().await;
            }
        }
        Err(e) => {
            tracing::warn!(interview_id = %interview_id, role = %role, error = %e, "Join failed");
            connection.reject(&e);
        }
    }
}

/// 방 나가기 처리
pub async fn handle_leave_interview(connection: &mut Connection, interview_id: &str) {
    let Some(room) = connection.room.take() else {
        connection.reject(&CoordinatorError::NotJoined(interview_id.to_string()));
        return;
    };
    if room.interview_id != interview_id {
        connection.reject(&CoordinatorError::NotJoined(interview_id.to_string()));
        connection.room = Some(room);
        return;
    }

    if let Err(e) = room.leave().await {
        tracing::debug!(interview_id = %interview_id, error = %e, "Room already closed");
    }
    tracing::info!(connection_id = %connection.id(), interview_id = %interview_id, "Left interview");
}

/// 면접 진행 상태 변경을 방 전체에 알린다
pub async fn handle_status_update(connection: &Connection, interview_id: &str, status: String) {
    let room = match super::signaling::joined_room(connection, interview_id) {
        Ok(room) => room,
        Err(e) => return connection.reject(&e),
    };
    if let Err(e) = room.relay(Signal::StatusUpdate(status)).await {
        connection.reject(&e);
    }
}
