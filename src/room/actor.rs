//! 방 액터
//!
//! 방 하나의 상태(두 참가자 세션, ICE 버퍼, 캡처)는 이 태스크만 만진다.
//! 연결 태스크들은 `RoomCommand`를 보내고, 나가는 메시지는 각 연결의 채널로 흘려보낸다.
//! 시간 기반 처리(유예 기간, ICE 타임아웃, 버퍼 만료, 방 정리)는 가장 가까운
//! 데드라인 하나를 골라 기다리는 방식이라 폴링이 없다.

use super::capture::{CaptureServices, CaptureSession};
use super::command::{
    ConnectionHandle, ParticipantSnapshot, RoomCommand, RoomSnapshot, Signal,
};
use super::event::{LeaveReason, RoomEvent};
use super::ice_buffer::IceBuffer;
use super::relay;
use crate::capture::LatestFrame;
use crate::config::{Config, DuplicateRolePolicy};
use crate::error::CoordinatorError;
use crate::protocol::ServerMessage;
use crate::session::{PeerSession, Role, SessionEvent, SessionState};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const ROLES: [Role; 2] = [Role::Candidate, Role::Recruiter];

struct Participant {
    session: PeerSession,
    connection: Option<ConnectionHandle>,
    /// 끊긴 뒤 재접속을 기다리는 기한
    grace_deadline: Option<Instant>,
    /// 협상이 `connected`에 도달해야 하는 기한
    negotiation_deadline: Option<Instant>,
}

impl Participant {
    fn new(role: Role, user_id: String, connection: ConnectionHandle) -> Self {
        Self {
            session: PeerSession::new(role, user_id),
            connection: Some(connection),
            grace_deadline: None,
            negotiation_deadline: None,
        }
    }

    fn is_live(&self) -> bool {
        self.connection.is_some() && self.session.state() != SessionState::Disconnected
    }

    fn owns(&self, connection_id: &str) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.id == connection_id)
    }

    fn send(&self, message: ServerMessage) {
        if let Some(connection) = &self.connection {
            connection.send(message);
        }
    }

    fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            user_id: self.session.user_id().to_string(),
            state: self.session.state(),
            live: self.is_live(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

pub struct Room {
    interview_id: String,
    config: Arc<Config>,
    candidate: Option<Participant>,
    recruiter: Option<Participant>,
    ice_buffer: IceBuffer,
    renegotiations_left: u32,
    status: Option<String>,
    teardown_deadline: Option<Instant>,
    frames: LatestFrame,
    capture: Option<CaptureSession>,
    services: Option<Arc<CaptureServices>>,
    commands: mpsc::Receiver<RoomCommand>,
    cancel: CancellationToken,
    events: broadcast::Sender<RoomEvent>,
}

impl Room {
    pub fn new(
        interview_id: &str,
        config: Arc<Config>,
        services: Option<Arc<CaptureServices>>,
        commands: mpsc::Receiver<RoomCommand>,
        cancel: CancellationToken,
        events: broadcast::Sender<RoomEvent>,
    ) -> Self {
        let ice_buffer = IceBuffer::new(
            config.room.ice_buffer_capacity,
            config.room.ice_buffer_ttl(),
        );
        let renegotiations_left = config.room.max_renegotiations;

        Self {
            interview_id: interview_id.to_string(),
            config,
            candidate: None,
            recruiter: None,
            ice_buffer,
            renegotiations_left,
            status: None,
            teardown_deadline: None,
            frames: LatestFrame::new(),
            capture: None,
            services,
            commands,
            cancel,
            events,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(interview_id = %self.interview_id, "Room opened");

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = wait_until(deadline) => {
                    if self.on_deadline(Instant::now()) == Flow::Close {
                        break;
                    }
                }
            }
        }

        self.close().await;
    }

    fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                role,
                user_id,
                connection,
                reply,
            } => self.handle_join(role, user_id, connection, reply),
            RoomCommand::Leave {
                role,
                connection_id,
            } => self.handle_leave(role, connection_id.as_deref()),
            RoomCommand::TransportClosed {
                role,
                connection_id,
            } => self.handle_transport_closed(role, &connection_id),
            RoomCommand::Signal {
                from,
                connection_id,
                signal,
            } => self.handle_signal(from, &connection_id, signal),
            RoomCommand::Frame {
                connection_id,
                frame,
            } => self.handle_frame(&connection_id, frame),
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    // ---- 입장 / 퇴장 -------------------------------------------------------

    fn handle_join(
        &mut self,
        role: Role,
        user_id: String,
        connection: ConnectionHandle,
        reply: oneshot::Sender<Result<SessionState, CoordinatorError>>,
    ) {
        let existing = self.slot_mut(role).take();
        let (event, participant) = match existing {
            Some(current)
                if current.is_live()
                    && self.config.room.duplicate_role_policy == DuplicateRolePolicy::Reject =>
            {
                *self.slot_mut(role) = Some(current);
                let error = CoordinatorError::RoleOccupied {
                    interview_id: self.interview_id.clone(),
                    role,
                };
                tracing::warn!(interview_id = %self.interview_id, role = %role, "Join rejected: role occupied");
                let _ = reply.send(Err(error));
                return;
            }
            Some(mut current) if current.is_live() => {
                if let Some(old) = current.connection.take() {
                    old.send(ServerMessage::SessionReplaced {
                        interview_id: self.interview_id.clone(),
                    });
                    old.kick.cancel();
                }
                tracing::info!(
                    interview_id = %self.interview_id,
                    role = %role,
                    replaced = %current.session.user_id(),
                    "Evicting previous connection for role"
                );
                self.discard_candidates(role);
                self.emit(RoomEvent::PeerLeft {
                    interview_id: self.interview_id.clone(),
                    role,
                    reason: LeaveReason::Replaced,
                });
                (SessionEvent::Join, Participant::new(role, user_id, connection))
            }
            Some(mut current) if current.session.state() == SessionState::Disconnected => {
                current.session.set_user_id(user_id);
                current.connection = Some(connection);
                current.grace_deadline = None;
                current.negotiation_deadline = None;
                (SessionEvent::Reconnect, current)
            }
            _ => (SessionEvent::Join, Participant::new(role, user_id, connection)),
        };
        *self.slot_mut(role) = Some(participant);

        let state = match self.transition(role, event) {
            Ok(state) => state,
            Err(error) => {
                tracing::error!(interview_id = %self.interview_id, role = %role, error = %error, "Join transition failed");
                *self.slot_mut(role) = None;
                let _ = reply.send(Err(error));
                return;
            }
        };
        self.teardown_deadline = None;

        let reconnect = event == SessionEvent::Reconnect;
        let user_id = self
            .slot(role)
            .as_ref()
            .map(|p| p.session.user_id().to_string())
            .unwrap_or_default();
        self.send_to(
            role,
            ServerMessage::JoinedInterview {
                interview_id: self.interview_id.clone(),
                role,
                state,
            },
        );
        self.emit(RoomEvent::PeerJoined {
            interview_id: self.interview_id.clone(),
            role,
            user_id: user_id.clone(),
        });
        tracing::info!(
            interview_id = %self.interview_id,
            role = %role,
            user_id = %user_id,
            reconnect,
            "Participant joined"
        );
        let _ = reply.send(Ok(state));

        self.announce_presence(Some(role));
    }

    fn handle_leave(&mut self, role: Role, connection_id: Option<&str>) {
        if let Some(id) = connection_id {
            if !self.owns(role, id) {
                tracing::debug!(interview_id = %self.interview_id, role = %role, "Leave from stale connection ignored");
                return;
            }
        }
        let was_live = self.live(role).is_some();
        if self.slot(role).is_none() {
            return;
        }

        let _ = self.transition(role, SessionEvent::Leave);
        *self.slot_mut(role) = None;
        self.discard_candidates(role);
        self.emit(RoomEvent::PeerLeft {
            interview_id: self.interview_id.clone(),
            role,
            reason: LeaveReason::Explicit,
        });
        tracing::info!(interview_id = %self.interview_id, role = %role, "Participant left");

        if was_live {
            self.on_peer_gone(role);
        }
        self.refresh_teardown(Instant::now());
    }

    fn handle_transport_closed(&mut self, role: Role, connection_id: &str) {
        if !self.owns(role, connection_id) {
            return;
        }
        let grace = Instant::now() + self.config.room.grace_period();
        if let Some(participant) = self.slot_mut(role).as_mut() {
            participant.connection = None;
            participant.grace_deadline = Some(grace);
        }
        let _ = self.transition(role, SessionEvent::TransportLost);
        self.discard_candidates(role);

        self.emit(RoomEvent::PeerLeft {
            interview_id: self.interview_id.clone(),
            role,
            reason: LeaveReason::TransportClosed,
        });
        tracing::info!(
            interview_id = %self.interview_id,
            role = %role,
            error = %CoordinatorError::TransportClosed,
            grace_ms = self.config.room.grace_period_ms,
            "Participant disconnected, waiting for reconnect"
        );

        self.on_peer_gone(role);
        self.refresh_teardown(Instant::now());
    }

    /// 한쪽이 빠졌을 때 남은 쪽에게 알리고 협상을 초기 상태로 되돌린다
    fn on_peer_gone(&mut self, role: Role) {
        let remaining = role.peer();
        if self.live(remaining).is_none() {
            return;
        }
        let message = match role {
            Role::Candidate => ServerMessage::CandidateLeft {
                interview_id: self.interview_id.clone(),
            },
            Role::Recruiter => ServerMessage::RecruiterLeft {
                interview_id: self.interview_id.clone(),
            },
        };
        self.send_to(remaining, message);
        self.restart_negotiation(remaining);
    }

    /// 두 역할이 모두 살아있으면 양쪽에 상대가 있다고 알린다
    fn announce_presence(&mut self, joined: Option<Role>) {
        let (Some(candidate), Some(recruiter)) =
            (self.live(Role::Candidate), self.live(Role::Recruiter))
        else {
            return;
        };
        let candidate_id = candidate.session.user_id().to_string();
        let recruiter_id = recruiter.session.user_id().to_string();

        // 새로 들어온 쪽과 다시 협상해야 하므로 상대를 되돌린다
        if let Some(role) = joined {
            self.restart_negotiation(role.peer());
        }

        if joined == Some(Role::Candidate) {
            self.send_to(
                Role::Recruiter,
                ServerMessage::CandidateJoined {
                    interview_id: self.interview_id.clone(),
                    candidate_id,
                },
            );
        }
        self.send_to(
            Role::Candidate,
            ServerMessage::RecruiterWantsToWatch {
                interview_id: self.interview_id.clone(),
                recruiter_id,
            },
        );
        self.send_to(
            Role::Recruiter,
            ServerMessage::CandidateAvailable {
                interview_id: self.interview_id.clone(),
            },
        );
        tracing::info!(interview_id = %self.interview_id, "Both participants present");

        self.flush_ice_buffer();
    }

    fn restart_negotiation(&mut self, role: Role) {
        let event = match self.live(role).map(|p| p.session.state()) {
            Some(SessionState::Joined) | None => return,
            Some(SessionState::Ended) => SessionEvent::Renegotiate,
            Some(_) => SessionEvent::Reset,
        };
        let _ = self.transition(role, event);
    }

    // ---- 중계 --------------------------------------------------------------

    fn handle_signal(&mut self, from: Role, connection_id: &str, signal: Signal) {
        if !self.owns_live(from, connection_id) {
            tracing::debug!(
                interview_id = %self.interview_id,
                role = %from,
                kind = signal.kind(),
                "Signal from stale connection ignored"
            );
            return;
        }

        let kind = signal.kind();
        let result = match signal {
            Signal::Offer(sdp) => self.relay_offer(from, sdp),
            Signal::Answer(sdp) => self.relay_answer(from, sdp),
            Signal::IceCandidate(candidate) => {
                self.relay_ice_candidate(from, candidate);
                Ok(())
            }
            Signal::ConnectionFailed => {
                self.handle_reported_failure(from);
                Ok(())
            }
            Signal::StatusUpdate(status) => {
                self.broadcast_status(status);
                Ok(())
            }
        };

        if let Err(error) = result {
            self.report_dropped(from, kind, error);
        }
    }

    fn relay_offer(&mut self, from: Role, sdp: serde_json::Value) -> Result<(), CoordinatorError> {
        let candidate = self
            .live(Role::Candidate)
            .map(|p| p.session.state())
            .unwrap_or(SessionState::Idle);
        relay::admit_offer(from, candidate, self.live_state(Role::Recruiter))?;

        self.transition(Role::Candidate, SessionEvent::LocalOffer)?;
        self.transition(Role::Recruiter, SessionEvent::RemoteOffer)?;
        self.send_to(
            Role::Recruiter,
            ServerMessage::WebrtcOffer {
                interview_id: self.interview_id.clone(),
                sdp,
            },
        );
        tracing::debug!(interview_id = %self.interview_id, "Relayed offer");
        Ok(())
    }

    fn relay_answer(&mut self, from: Role, sdp: serde_json::Value) -> Result<(), CoordinatorError> {
        let recruiter = self
            .live(Role::Recruiter)
            .map(|p| p.session.state())
            .unwrap_or(SessionState::Idle);
        relay::admit_answer(from, self.live_state(Role::Candidate), recruiter)?;

        self.transition(Role::Recruiter, SessionEvent::LocalAnswer)?;
        self.send_to(
            Role::Candidate,
            ServerMessage::WebrtcAnswer {
                interview_id: self.interview_id.clone(),
                sdp,
            },
        );
        self.transition(Role::Candidate, SessionEvent::RemoteAnswer)?;
        self.transition(Role::Recruiter, SessionEvent::AnswerAccepted)?;
        tracing::debug!(interview_id = %self.interview_id, "Relayed answer");
        Ok(())
    }

    fn relay_ice_candidate(&mut self, from: Role, candidate: serde_json::Value) {
        let to = from.peer();
        if self.live(to).is_some() {
            self.send_to(
                to,
                ServerMessage::WebrtcIceCandidate {
                    interview_id: self.interview_id.clone(),
                    candidate,
                },
            );
            tracing::debug!(interview_id = %self.interview_id, from = %from, "Relayed ICE candidate");
        } else if self.ice_buffer.push(from, candidate, Instant::now()) {
            tracing::debug!(
                interview_id = %self.interview_id,
                from = %from,
                buffered = self.ice_buffer.len(),
                "Buffered ICE candidate until peer joins"
            );
        } else {
            tracing::warn!(interview_id = %self.interview_id, from = %from, "ICE buffer full, candidate dropped");
        }
    }

    fn flush_ice_buffer(&mut self) {
        if self.ice_buffer.is_empty() {
            return;
        }
        let buffered = self.ice_buffer.drain();
        let count = buffered.len();
        for entry in buffered {
            self.send_to(
                entry.from.peer(),
                ServerMessage::WebrtcIceCandidate {
                    interview_id: self.interview_id.clone(),
                    candidate: entry.candidate,
                },
            );
        }
        tracing::debug!(interview_id = %self.interview_id, count, "Flushed buffered ICE candidates");
    }

    /// 사라진 연결이 남긴 후보는 다음 상대에게 넘기지 않는다
    fn discard_candidates(&mut self, role: Role) {
        let discarded = self.ice_buffer.discard_from(role);
        if discarded > 0 {
            tracing::debug!(interview_id = %self.interview_id, role = %role, discarded, "Discarded ICE candidates of departed connection");
        }
    }

    fn broadcast_status(&mut self, status: String) {
        tracing::info!(interview_id = %self.interview_id, status = %status, "Interview status changed");
        for role in ROLES {
            self.send_to(
                role,
                ServerMessage::InterviewStatusChanged {
                    interview_id: self.interview_id.clone(),
                    status: status.clone(),
                },
            );
        }
        self.status = Some(status);
    }

    fn report_dropped(&mut self, from: Role, kind: &'static str, error: CoordinatorError) {
        match error {
            CoordinatorError::GlareIgnored => {
                tracing::warn!(interview_id = %self.interview_id, from = %from, "Glare: second offer ignored");
                self.emit(RoomEvent::GlareIgnored {
                    interview_id: self.interview_id.clone(),
                });
            }
            CoordinatorError::StaleAnswer => {
                tracing::warn!(interview_id = %self.interview_id, from = %from, "Stale answer dropped");
                self.emit(RoomEvent::StaleAnswer {
                    interview_id: self.interview_id.clone(),
                });
            }
            error => {
                tracing::warn!(
                    interview_id = %self.interview_id,
                    from = %from,
                    kind,
                    error = %error,
                    "Signal rejected"
                );
                self.send_to(from, ServerMessage::error(error.code(), error.to_string()));
            }
        }
    }

    // ---- 협상 실패 ---------------------------------------------------------

    fn handle_reported_failure(&mut self, from: Role) {
        let state = self.live_state(from);
        if !state.is_some_and(|s| s.is_negotiating() || s == SessionState::Connected) {
            tracing::debug!(interview_id = %self.interview_id, from = %from, "Failure report outside negotiation ignored");
            return;
        }
        self.handle_negotiation_failure(CoordinatorError::ConnectionFailed(format!(
            "ICE failure reported by {from}"
        )));
    }

    /// 방 수명 동안 정해진 횟수만큼만 재협상하고, 그 뒤엔 양쪽에 실패를 알린다
    fn handle_negotiation_failure(&mut self, cause: CoordinatorError) {
        tracing::warn!(interview_id = %self.interview_id, error = %cause, "Negotiation failed");
        if matches!(cause, CoordinatorError::IceTimeout(_)) {
            self.emit(RoomEvent::IceTimeout {
                interview_id: self.interview_id.clone(),
            });
        }

        for role in ROLES {
            if self.live(role).is_some() {
                let _ = self.transition(role, SessionEvent::Fail);
            }
        }

        let both_live = self.live(Role::Candidate).is_some() && self.live(Role::Recruiter).is_some();
        if both_live && self.renegotiations_left > 0 {
            self.renegotiations_left -= 1;
            for role in ROLES {
                let _ = self.transition(role, SessionEvent::Renegotiate);
            }
            self.ice_buffer.clear();
            self.emit(RoomEvent::Renegotiated {
                interview_id: self.interview_id.clone(),
            });
            tracing::info!(
                interview_id = %self.interview_id,
                renegotiations_left = self.renegotiations_left,
                "Restarting negotiation"
            );
            self.announce_presence(None);
            return;
        }

        let terminal = CoordinatorError::ConnectionFailed(cause.to_string());
        for role in ROLES {
            self.send_to(
                role,
                ServerMessage::ConnectionFailed {
                    interview_id: self.interview_id.clone(),
                    reason: cause.to_string(),
                },
            );
        }
        self.emit(RoomEvent::ConnectionFailed {
            interview_id: self.interview_id.clone(),
        });
        tracing::warn!(interview_id = %self.interview_id, error = %terminal, "Giving up on connection");
    }

    // ---- 캡처 --------------------------------------------------------------

    fn handle_frame(&mut self, connection_id: &str, frame: Bytes) {
        if self.owns_live(Role::Candidate, connection_id) {
            self.frames.publish(frame);
        }
    }

    /// candidate가 `connected`일 때만 캡처가 돈다
    fn sync_capture(&mut self, candidate_state: SessionState) {
        if candidate_state != SessionState::Connected {
            if let Some(capture) = self.capture.as_mut() {
                capture.stop();
            }
            return;
        }
        let Some(services) = self.services.as_ref() else {
            return;
        };
        let capture = self.capture.get_or_insert_with(|| {
            CaptureSession::new(
                &self.interview_id,
                services,
                self.frames.clone(),
                &self.cancel,
            )
        });
        if capture.start() {
            tracing::info!(interview_id = %self.interview_id, "Capture started");
        }
    }

    // ---- 상태 전이 ---------------------------------------------------------

    /// 전이 적용 후 알림/이벤트/데드라인/캡처를 맞춘다
    fn transition(
        &mut self,
        role: Role,
        event: SessionEvent,
    ) -> Result<SessionState, CoordinatorError> {
        let ice_timeout = self.config.room.ice_timeout();
        let interview_id = self.interview_id.clone();
        let participant = self
            .slot_mut(role)
            .as_mut()
            .ok_or(CoordinatorError::PeerAbsent)?;

        let previous = participant.session.state();
        let state = participant.session.apply(event)?;
        if state.is_negotiating() {
            participant
                .negotiation_deadline
                .get_or_insert_with(|| Instant::now() + ice_timeout);
        } else {
            participant.negotiation_deadline = None;
        }
        if state != previous {
            participant.send(ServerMessage::SessionState {
                interview_id: interview_id.clone(),
                state,
            });
        }

        if state != previous {
            tracing::debug!(
                interview_id = %interview_id,
                role = %role,
                from = ?previous,
                to = ?state,
                "Session state changed"
            );
            self.emit(RoomEvent::StateChanged {
                interview_id,
                role,
                state,
            });
        }
        if role == Role::Candidate {
            self.sync_capture(state);
        }
        Ok(state)
    }

    // ---- 시간 처리 ---------------------------------------------------------

    fn next_deadline(&self) -> Option<Instant> {
        ROLES
            .iter()
            .filter_map(|role| self.slot(*role).as_ref())
            .flat_map(|p| [p.grace_deadline, p.negotiation_deadline])
            .chain([self.teardown_deadline, self.ice_buffer.next_expiry()])
            .flatten()
            .min()
    }

    fn on_deadline(&mut self, now: Instant) -> Flow {
        for role in ROLES {
            let expired = self
                .slot(role)
                .as_ref()
                .and_then(|p| p.grace_deadline)
                .is_some_and(|deadline| deadline <= now);
            if expired {
                let _ = self.transition(role, SessionEvent::Leave);
                *self.slot_mut(role) = None;
                self.emit(RoomEvent::PeerLeft {
                    interview_id: self.interview_id.clone(),
                    role,
                    reason: LeaveReason::GraceExpired,
                });
                tracing::info!(interview_id = %self.interview_id, role = %role, "Reconnect window expired");
            }
        }

        let negotiation_expired = ROLES.iter().any(|role| {
            self.live(*role)
                .and_then(|p| p.negotiation_deadline)
                .is_some_and(|deadline| deadline <= now)
        });
        if negotiation_expired {
            self.handle_negotiation_failure(CoordinatorError::IceTimeout(
                self.config.room.ice_timeout(),
            ));
        }

        let expired = self.ice_buffer.expire(now);
        if expired > 0 {
            tracing::debug!(interview_id = %self.interview_id, expired, "Discarded unconsumed ICE candidates");
        }

        self.refresh_teardown(now);
        match self.teardown_deadline {
            Some(deadline) if deadline <= now => Flow::Close,
            _ => Flow::Continue,
        }
    }

    /// 살아있는 연결이 없으면 유예 기간 뒤 방을 닫는다
    fn refresh_teardown(&mut self, now: Instant) {
        let anyone_live = ROLES.iter().any(|role| self.live(*role).is_some());
        if anyone_live {
            self.teardown_deadline = None;
        } else if self.teardown_deadline.is_none() {
            self.teardown_deadline = Some(now + self.config.room.grace_period());
        }
    }

    async fn close(mut self) {
        self.commands.close();
        self.cancel.cancel();

        for role in ROLES {
            if self.live(role).is_some() {
                let error = CoordinatorError::RoomClosed(self.interview_id.clone());
                self.send_to(role, ServerMessage::error(error.code(), error.to_string()));
            }
        }
        if let Some(capture) = self.capture.take() {
            capture.finish().await;
        }

        self.emit(RoomEvent::RoomClosed {
            interview_id: self.interview_id.clone(),
        });
        tracing::info!(interview_id = %self.interview_id, "Room closed");
    }

    // ---- 헬퍼 --------------------------------------------------------------

    fn slot(&self, role: Role) -> &Option<Participant> {
        match role {
            Role::Candidate => &self.candidate,
            Role::Recruiter => &self.recruiter,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Participant> {
        match role {
            Role::Candidate => &mut self.candidate,
            Role::Recruiter => &mut self.recruiter,
        }
    }

    fn live(&self, role: Role) -> Option<&Participant> {
        self.slot(role).as_ref().filter(|p| p.is_live())
    }

    fn live_state(&self, role: Role) -> Option<SessionState> {
        self.live(role).map(|p| p.session.state())
    }

    fn owns(&self, role: Role, connection_id: &str) -> bool {
        self.slot(role)
            .as_ref()
            .is_some_and(|p| p.owns(connection_id))
    }

    fn owns_live(&self, role: Role, connection_id: &str) -> bool {
        self.live(role).is_some_and(|p| p.owns(connection_id))
    }

    fn send_to(&self, role: Role, message: ServerMessage) {
        if let Some(participant) = self.slot(role) {
            participant.send(message);
        }
    }

    fn emit(&self, event: RoomEvent) {
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            interview_id: self.interview_id.clone(),
            candidate: self.candidate.as_ref().map(Participant::snapshot),
            recruiter: self.recruiter.as_ref().map(Participant::snapshot),
            status: self.status.clone(),
            renegotiations_left: self.renegotiations_left,
            capture_running: self.capture.as_ref().is_some_and(CaptureSession::is_running),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
