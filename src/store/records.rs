//! Game record persistence

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{GameResult, MatchEnding};
use crate::ws::protocol::Achievement;

use super::supabase::{SupabaseClient, SupabaseError};

/// Persisted game record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: Uuid,
    pub player_a_id: Uuid,
    pub player_b_id: Uuid,
    pub score_a: i32,
    pub score_b: i32,
    pub winner_id: Uuid,
    /// Set when the match ended because this user left
    pub forfeited_by: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// New game record for insertion
#[derive(Debug, Clone, Serialize)]
pub struct NewGameRecord {
    pub id: Uuid,
    pub player_a_id: Uuid,
    pub player_b_id: Uuid,
    pub score_a: i32,
    pub score_b: i32,
    pub winner_id: Uuid,
    pub forfeited_by: Option<Uuid>,
}

impl From<&GameResult> for NewGameRecord {
    fn from(result: &GameResult) -> Self {
        let forfeited_by = match result.ending {
            MatchEnding::Forfeit { by } => Some(by),
            MatchEnding::ScoreLimit => None,
        };

        Self {
            id: result.room_id,
            player_a_id: result.player_a_id,
            player_b_id: result.player_b_id,
            score_a: result.score_a as i32,
            score_b: result.score_b as i32,
            winner_id: result.winner_id,
            forfeited_by,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct NewAchievement {
    user_id: Uuid,
    kind: Achievement,
}

/// Record store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Supabase error: {0}")]
    Supabase(#[from] SupabaseError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator for finished games and achievements
#[async_trait]
pub trait GameRecordStore: Send + Sync {
    async fn save_game_record(&self, result: &GameResult) -> Result<(), StoreError>;

    async fn get_win_count(&self, user_id: Uuid) -> Result<u32, StoreError>;

    async fn record_achievement(&self, user_id: Uuid, kind: Achievement) -> Result<(), StoreError>;

    /// Records the user took part in, newest first
    async fn get_records(&self, user_id: Uuid) -> Result<Vec<GameRecord>, StoreError>;
}

/// Game records backed by Supabase tables `game_records` and `achievements`
#[derive(Clone)]
pub struct SupabaseRecordStore {
    client: SupabaseClient,
}

impl SupabaseRecordStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GameRecordStore for SupabaseRecordStore {
    async fn save_game_record(&self, result: &GameResult) -> Result<(), StoreError> {
        let record = NewGameRecord::from(result);
        let _: GameRecord = self.client.insert("game_records", &record).await?;
        Ok(())
    }

    async fn get_win_count(&self, user_id: Uuid) -> Result<u32, StoreError> {
        let query = format!("winner_id=eq.{}", user_id);
        let wins = self.client.count("game_records", &query).await?;
        Ok(wins.try_into().unwrap_or(u32::MAX))
    }

    async fn record_achievement(&self, user_id: Uuid, kind: Achievement) -> Result<(), StoreError> {
        let achievement = NewAchievement { user_id, kind };
        self.client
            .upsert("achievements", &achievement, "user_id,kind")
            .await?;
        Ok(())
    }

    async fn get_records(&self, user_id: Uuid) -> Result<Vec<GameRecord>, StoreError> {
        let query = format!(
            "or=(player_a_id.eq.{id},player_b_id.eq.{id})&order=created_at.desc",
            id = user_id
        );
        Ok(self.client.get("game_records", &query).await?)
    }
}
