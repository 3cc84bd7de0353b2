//! In-memory collaborators for unit tests

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::game::GameResult;
use crate::store::records::{GameRecord, GameRecordStore, StoreError};
use crate::ws::hub::{Dispatch, Notifier, Transport};
use crate::ws::protocol::{Achievement, ConnectionId, ServerMsg, SpeedTier};

/// Transport that records every dispatch
#[derive(Default)]
pub struct RecordingTransport {
    log: Mutex<Vec<Dispatch>>,
}

impl RecordingTransport {
    pub fn messages_for(&self, connection: ConnectionId) -> Vec<ServerMsg> {
        self.log
            .lock()
            .iter()
            .filter_map(|d| match d {
                Dispatch::Send(to, msg) if *to == connection => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn was_closed(&self, connection: ConnectionId) -> bool {
        self.log
            .lock()
            .iter()
            .any(|d| *d == Dispatch::Close(connection))
    }
}

impl Transport for RecordingTransport {
    fn send(&self, to: ConnectionId, msg: ServerMsg) {
        self.log.lock().push(Dispatch::Send(to, msg));
    }

    fn close(&self, connection: ConnectionId) {
        self.log.lock().push(Dispatch::Close(connection));
    }
}

/// Notifier that records invitations and start signals
#[derive(Default)]
pub struct RecordingNotifier {
    pub invites: Mutex<Vec<(Uuid, Uuid, SpeedTier)>>,
    pub start_signals: Mutex<Vec<Uuid>>,
}

impl Notifier for RecordingNotifier {
    fn send_game_invite(&self, receiver_id: Uuid, sender_id: Uuid, speed: SpeedTier) {
        self.invites.lock().push((receiver_id, sender_id, speed));
    }

    fn send_signal_to_start_game(&self, user_id: Uuid) {
        self.start_signals.lock().push(user_id);
    }
}

/// Record store kept in memory; can be told to fail the first saves
#[derive(Default)]
pub struct MemoryRecordStore {
    saved: Mutex<Vec<GameResult>>,
    achievements: Mutex<Vec<(Uuid, Achievement)>>,
    failures_left: AtomicU32,
    save_attempts: AtomicU32,
}

impl MemoryRecordStore {
    pub fn failing_saves(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<GameResult> {
        self.saved.lock().clone()
    }

    pub fn achievements(&self) -> Vec<(Uuid, Achievement)> {
        self.achievements.lock().clone()
    }

    pub fn save_attempts(&self) -> u32 {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameRecordStore for MemoryRecordStore {
    async fn save_game_record(&self, result: &GameResult) -> Result<(), StoreError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        self.saved.lock().push(result.clone());
        Ok(())
    }

    async fn get_win_count(&self, user_id: Uuid) -> Result<u32, StoreError> {
        Ok(self
            .saved
            .lock()
            .iter()
            .filter(|r| r.winner_id == user_id)
            .count() as u32)
    }

    async fn record_achievement(&self, user_id: Uuid, kind: Achievement) -> Result<(), StoreError> {
        self.achievements.lock().push((user_id, kind));
        Ok(())
    }

    async fn get_records(&self, _user_id: Uuid) -> Result<Vec<GameRecord>, StoreError> {
        Ok(Vec::new())
    }
}
