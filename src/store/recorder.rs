//! Hand-off of finished games to the record store

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::game::GameResult;
use crate::ws::protocol::Achievement;

use super::records::{GameRecordStore, StoreError};

/// Delay before the first retry; doubles on each further attempt
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(250);

/// Saves each finished game, retrying transient store failures
///
/// Rooms are already gone from the active set when a result arrives here,
/// so a result that exhausts its attempts is logged in full for replay.
#[derive(Clone)]
pub struct ResultRecorder {
    store: Arc<dyn GameRecordStore>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn GameRecordStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Persist a result, then check the winner for a new achievement
    pub async fn record(&self, result: &GameResult) -> Result<(), StoreError> {
        self.save_with_retry(result).await?;

        info!(
            room_id = %result.room_id,
            player_a = %result.player_a_id,
            player_b = %result.player_b_id,
            score_a = result.score_a,
            score_b = result.score_b,
            "Game record saved"
        );

        if let Err(e) = self.check_achievements(result.winner_id).await {
            warn!(user_id = %result.winner_id, error = %e, "Achievement check failed");
        }

        Ok(())
    }

    async fn save_with_retry(&self, result: &GameResult) -> Result<(), StoreError> {
        let mut backoff = self.base_backoff;
        let mut attempt = 1;

        loop {
            match self.store.save_game_record(result).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        room_id = %result.room_id,
                        attempt,
                        error = %e,
                        "Saving game record failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        room_id = %result.room_id,
                        player_a = %result.player_a_id,
                        player_b = %result.player_b_id,
                        score_a = result.score_a,
                        score_b = result.score_b,
                        winner_id = %result.winner_id,
                        attempts = attempt,
                        error = %e,
                        "Game record lost after retries"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn check_achievements(&self, winner_id: Uuid) -> Result<(), StoreError> {
        let wins = self.store.get_win_count(winner_id).await?;
        if let Some(kind) = Achievement::for_win_count(wins) {
            self.store.record_achievement(winner_id, kind).await?;
            info!(user_id = %winner_id, wins, achievement = ?kind, "Achievement unlocked");
        }
        Ok(())
    }
}
