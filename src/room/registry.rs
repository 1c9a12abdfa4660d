//! 면접 방 레지스트리
//!
//! interview id마다 방 액터 하나. 첫 입장 때 만들어지고, 액터가 끝나면 스스로 빠진다.

use super::actor::Room;
use super::capture::CaptureServices;
use super::command::{ConnectionHandle, RoomCommand, RoomSnapshot, Signal};
use super::event::RoomEvent;
use crate::config::Config;
use crate::error::CoordinatorError;
use crate::session::Role;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;
/// 닫히는 중인 방과 경합했을 때 새 방을 만들어 다시 시도하는 횟수
const JOIN_ATTEMPTS: usize = 3;

struct RoomEntry {
    commands: mpsc::Sender<RoomCommand>,
    generation: u64,
}

struct Inner {
    rooms: DashMap<String, RoomEntry>,
    config: Arc<Config>,
    services: Option<Arc<CaptureServices>>,
    events: broadcast::Sender<RoomEvent>,
    generation: AtomicU64,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<Inner>,
}

impl RoomRegistry {
    pub fn new(config: Arc<Config>, services: Option<Arc<CaptureServices>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                rooms: DashMap::new(),
                config,
                services,
                events,
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// 모든 방의 상태 변화 구독
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.inner.events.subscribe()
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    /// 방에 참가자를 넣는다. 방이 없으면 만든다.
    pub async fn join(
        &self,
        interview_id: &str,
        role: Role,
        user_id: &str,
        connection: ConnectionHandle,
    ) -> Result<RoomHandle, CoordinatorError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(CoordinatorError::RoomClosed(interview_id.to_string()));
        }
        let connection_id = connection.id.clone();

        for attempt in 1..=JOIN_ATTEMPTS {
            let (commands, generation) = self.room_sender(interview_id);
            let (reply, response) = oneshot::channel();
            let command = RoomCommand::Join {
                role,
                user_id: user_id.to_string(),
                connection: connection.clone(),
                reply,
            };

            let joined = match commands.send(command).await {
                Ok(()) => response.await.ok(),
                Err(_) => None,
            };
            match joined {
                Some(Ok(_)) => {
                    return Ok(RoomHandle {
                        interview_id: interview_id.to_string(),
                        role,
                        connection_id,
                        commands,
                    })
                }
                Some(Err(error)) => return Err(error),
                None => {
                    tracing::debug!(interview_id, attempt, "Room closed during join, retrying");
                    self.inner
                        .rooms
                        .remove_if(interview_id, |_, entry| entry.generation == generation);
                }
            }
        }

        Err(CoordinatorError::RoomClosed(interview_id.to_string()))
    }

    /// 연결 없이 역할을 방에서 뺀다
    pub async fn leave(&self, interview_id: &str, role: Role) -> Result<(), CoordinatorError> {
        let commands = self
            .existing_sender(interview_id)
            .ok_or_else(|| CoordinatorError::RoomClosed(interview_id.to_string()))?;
        commands
            .send(RoomCommand::Leave {
                role,
                connection_id: None,
            })
            .await
            .map_err(|_| CoordinatorError::RoomClosed(interview_id.to_string()))
    }

    pub async fn get(&self, interview_id: &str) -> Option<RoomSnapshot> {
        let commands = self.existing_sender(interview_id)?;
        let (reply, response) = oneshot::channel();
        commands.send(RoomCommand::Snapshot { reply }).await.ok()?;
        response.await.ok()
    }

    /// 모든 방을 닫고 정리(이미지 URL 기록 포함)가 끝날 때까지 기다린다
    pub async fn shutdown(&self) {
        tracing::info!(rooms = self.room_count(), "Closing all rooms");
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }

    fn existing_sender(&self, interview_id: &str) -> Option<mpsc::Sender<RoomCommand>> {
        self.inner
            .rooms
            .get(interview_id)
            .map(|entry| entry.commands.clone())
    }

    fn room_sender(&self, interview_id: &str) -> (mpsc::Sender<RoomCommand>, u64) {
        let entry = self
            .inner
            .rooms
            .entry(interview_id.to_string())
            .or_insert_with(|| self.spawn_room(interview_id));
        (entry.commands.clone(), entry.generation)
    }

    fn spawn_room(&self, interview_id: &str) -> RoomEntry {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let room = Room::new(
            interview_id,
            self.inner.config.clone(),
            self.inner.services.clone(),
            rx,
            self.inner.shutdown.child_token(),
            self.inner.events.clone(),
        );

        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = interview_id.to_string();
        self.inner.tasks.spawn(async move {
            room.run().await;
            if let Some(inner) = registry.upgrade() {
                inner
                    .rooms
                    .remove_if(&id, |_, entry| entry.generation == generation);
            }
        });

        RoomEntry {
            commands,
            generation,
        }
    }
}

/// 한 연결이 입장한 방에 대한 핸들
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub interview_id: String,
    pub role: Role,
    pub connection_id: String,
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn relay(&self, signal: Signal) -> Result<(), CoordinatorError> {
        self.send(RoomCommand::Signal {
            from: self.role,
            connection_id: self.connection_id.clone(),
            signal,
        })
        .await
    }

    pub async fn leave(&self) -> Result<(), CoordinatorError> {
        self.send(RoomCommand::Leave {
            role: self.role,
            connection_id: Some(self.connection_id.clone()),
        })
        .await
    }

    pub async fn transport_closed(&self) -> Result<(), CoordinatorError> {
        self.send(RoomCommand::TransportClosed {
            role: self.role,
            connection_id: self.connection_id.clone(),
        })
        .await
    }

    /// 큐가 차 있으면 프레임을 버린다
    pub fn publish_frame(&self, frame: Bytes) -> Result<(), CoordinatorError> {
        match self.commands.try_send(RoomCommand::Frame {
            connection_id: self.connection_id.clone(),
            frame,
        }) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(CoordinatorError::RoomClosed(self.interview_id.clone()))
            }
        }
    }

    async fn send(&self, command: RoomCommand) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoordinatorError::RoomClosed(self.interview_id.clone()))
    }
}
