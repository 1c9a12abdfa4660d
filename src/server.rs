//! HTTP 라우터와 웹소켓 연결 루프

use crate::handlers::{self, Connection};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::Role;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// 연결 종료 후 남은 메시지(예: session-replaced)를 내보낼 시간
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*`가 있으면 모든 출처 허용
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Interview Signaling Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "interview-signaling-rs",
        "rooms": state.registry.room_count(),
        "uploads": state.uploads.as_ref().map(|u| u.stats()),
        "timestamp": SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // 연결 처리
    let mut connection = handlers::handle_connection(tx);
    let kicked = connection.kicked();

    // 송신 태스크
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to encode server message"),
            }
        }
        let _ = ws_sender.close().await;
    });

    // 수신 처리
    loop {
        let result = tokio::select! {
            _ = kicked.cancelled() => {
                tracing::info!(connection_id = %connection.id(), "Connection replaced by a newer one");
                break;
            }
            _ = state.shutdown.cancelled() => break,
            result = ws_receiver.next() => result,
        };

        match result {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &mut connection, msg).await,
                Err(e) => {
                    tracing::debug!(connection_id = %connection.id(), error = %e, "Unparseable message");
                    connection.send(ServerMessage::error("bad-message", e.to_string()));
                }
            },
            Some(Ok(Message::Binary(data))) => {
                handlers::handle_frame(&connection, Bytes::from(data));
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }

    // 연결 해제
    handlers::handle_disconnect(&mut connection).await;
    drop(connection);
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
}

async fn handle_client_message(state: &AppState, connection: &mut Connection, msg: ClientMessage) {
    match msg {
        ClientMessage::Heartbeat => {
            handlers::handle_heartbeat(connection);
        }
        ClientMessage::JoinInterviewCandidate {
            interview_id,
            candidate_id,
        } => {
            handlers::handle_join_interview(
                state,
                connection,
                Role::Candidate,
                &interview_id,
                &candidate_id,
            )
            .await;
        }
        ClientMessage::JoinInterviewRecruiter {
            interview_id,
            recruiter_id,
        } => {
            handlers::handle_join_interview(
                state,
                connection,
                Role::Recruiter,
                &interview_id,
                &recruiter_id,
            )
            .await;
        }
        ClientMessage::LeaveInterview { interview_id } => {
            handlers::handle_leave_interview(connection, &interview_id).await;
        }
        ClientMessage::InterviewStatusUpdate {
            interview_id,
            status,
        } => {
            handlers::handle_status_update(connection, &interview_id, status).await;
        }
        ClientMessage::WebrtcOffer { interview_id, sdp } => {
            handlers::handle_offer(connection, &interview_id, sdp).await;
        }
        ClientMessage::WebrtcAnswer { interview_id, sdp } => {
            handlers::handle_answer(connection, &interview_id, sdp).await;
        }
        ClientMessage::WebrtcIceCandidate {
            interview_id,
            candidate,
        } => {
            handlers::handle_ice_candidate(connection, &interview_id, candidate).await;
        }
        ClientMessage::WebrtcConnectionFailed { interview_id } => {
            handlers::handle_connection_failed(connection, &interview_id).await;
        }
        ClientMessage::RequestIceConfig { interview_id } => {
            handlers::handle_ice_config_request(state, connection, &interview_id);
        }
    }
}
