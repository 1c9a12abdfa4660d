//! 연결 핸들러

use crate::error::CoordinatorError;
use crate::protocol::ServerMessage;
use crate::room::{ConnectionHandle, RoomHandle};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 웹소켓 연결 하나의 상태. 한 번에 한 방에만 들어가 있다.
pub struct Connection {
    handle: ConnectionHandle,
    pub(crate) room: Option<RoomHandle>,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// 같은 역할의 새 연결에 밀려나면 취소된다
    pub fn kicked(&self) -> CancellationToken {
        self.handle.kick.clone()
    }

    pub fn room(&self) -> Option<&RoomHandle> {
        self.room.as_ref()
    }

    pub(crate) fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn send(&self, message: ServerMessage) {
        self.handle.send(message);
    }

    pub fn reject(&self, error: &CoordinatorError) {
        self.send(ServerMessage::error(error.code(), error.to_string()));
    }
}

/// 새 연결 처리
pub fn handle_connection(sender: UnboundedSender<ServerMessage>) -> Connection {
    let connection_id = Uuid::new_v4().to_string();
    let handle = ConnectionHandle::new(connection_id.clone(), sender);

    handle.send(ServerMessage::Connected {
        socket_id: connection_id.clone(),
    });

    tracing::info!(connection_id = %connection_id, "New connection established");
    Connection { handle, room: None }
}

/// 연결 해제 처리. 방에서는 바로 빠지지 않고 재접속 유예 기간에 들어간다.
pub async fn handle_disconnect(connection: &mut Connection) {
    if let Some(room) = connection.room.take() {
        if let Err(e) = room.transport_closed().await {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Room already closed");
        }
    }
    tracing::info!(connection_id = %connection.id(), "Connection closed");
}

/// Heartbeat 처리
pub fn handle_heartbeat(connection: &Connection) {
    connection.send(ServerMessage::HeartbeatAck);
}
