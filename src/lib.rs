//! Pong Arena Server - matchmaking and authoritative two-player pong
//!
//! Players connect over WebSocket, meet through speed-tier queues or direct
//! invitations, and play in server-simulated rooms. Finished games are stored
//! in Supabase.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod store;
pub mod util;
pub mod ws;

#[cfg(test)]
mod testing;
