//! 상대가 없을 때 도착한 ICE 후보 임시 보관

use crate::session::Role;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct BufferedCandidate {
    pub from: Role,
    pub candidate: serde_json::Value,
    pub received_at: Instant,
}

/// 용량과 TTL이 정해진 큐. 가득 차면 새 후보를 버린다.
#[derive(Debug)]
pub struct IceBuffer {
    capacity: usize,
    ttl: Duration,
    entries: VecDeque<BufferedCandidate>,
}

impl IceBuffer {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 가득 찼으면 false
    pub fn push(&mut self, from: Role, candidate: serde_json::Value, now: Instant) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push_back(BufferedCandidate {
            from,
            candidate,
            received_at: now,
        });
        true
    }

    /// 도착 순서대로 전부 꺼낸다
    pub fn drain(&mut self) -> Vec<BufferedCandidate> {
        self.entries.drain(..).collect()
    }

    /// 만료된 후보 제거, 제거한 개수 반환
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|entry| now.saturating_duration_since(entry.received_at) < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 한 역할이 보낸 후보만 버린다. 버린 개수 반환
    pub fn discard_from(&mut self, role: Role) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.from != role);
        before - self.entries.len()
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.front().map(|entry| entry.received_at + self.ttl)
    }
}
