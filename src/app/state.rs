//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::SessionManager;
use crate::matchmaking::MatchmakingService;
use crate::store::{GameRecordStore, ResultRecorder, SupabaseClient, SupabaseRecordStore};
use crate::ws::ConnectionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<ConnectionHub>,
    pub sessions: Arc<SessionManager>,
    pub matchmaking: Arc<MatchmakingService>,
    pub record_store: Arc<dyn GameRecordStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let supabase = SupabaseClient::new(&config);
        let record_store = Arc::new(SupabaseRecordStore::new(supabase));
        Self::with_store(config, record_store)
    }

    /// Wire everything around an existing record store
    pub fn with_store(config: Config, record_store: Arc<dyn GameRecordStore>) -> Self {
        let config = Arc::new(config);

        // One hub delivers both game traffic and social notifications
        let hub = Arc::new(ConnectionHub::new());

        let recorder = ResultRecorder::new(record_store.clone(), config.record_retry_attempts);
        let sessions = Arc::new(SessionManager::new(hub.clone(), recorder));

        let matchmaking = Arc::new(MatchmakingService::new(
            sessions.clone(),
            hub.clone(),
            hub.clone(),
        ));

        Self {
            config,
            hub,
            sessions,
            matchmaking,
            record_store,
        }
    }
}
