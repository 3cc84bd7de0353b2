//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle for one live WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Matchmaking bucket, also selects the ball speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedTier {
    Slow,
    Medium,
    Fast,
}

impl SpeedTier {
    pub const ALL: [SpeedTier; 3] = [SpeedTier::Slow, SpeedTier::Medium, SpeedTier::Fast];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedTier::Slow => "Slow",
            SpeedTier::Medium => "Medium",
            SpeedTier::Fast => "Fast",
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown speed tier: {0}")]
pub struct UnknownSpeedTier(pub String);

impl FromStr for SpeedTier {
    type Err = UnknownSpeedTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Slow" => Ok(SpeedTier::Slow),
            "Medium" => Ok(SpeedTier::Medium),
            "Fast" => Ok(SpeedTier::Fast),
            other => Err(UnknownSpeedTier(other.to_string())),
        }
    }
}

/// Paddle movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Achievements unlocked by total win count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Achievement {
    #[serde(rename = "WIN_1")]
    Win1,
    #[serde(rename = "WIN_10")]
    Win10,
    #[serde(rename = "WIN_100")]
    Win100,
}

impl Achievement {
    /// Achievement unlocked when the win count reaches exactly `wins`
    pub fn for_win_count(wins: u32) -> Option<Self> {
        match wins {
            1 => Some(Achievement::Win1),
            10 => Some(Achievement::Win10),
            100 => Some(Achievement::Win100),
            _ => None,
        }
    }
}

/// Messages sent from client to server
///
/// Speed tiers travel as raw strings so an unknown tier is reported as a
/// validation error instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMsg {
    /// Enter the matchmaking queue
    JoinQueue {
        #[serde(default)]
        speed: Option<String>,
    },

    /// Choose the preferred speed tier for later requests
    GameSpeed { speed: String },

    /// Invite a specific user to a match
    SendInvite {
        receiver_id: Uuid,
        #[serde(default)]
        speed: Option<String>,
    },

    /// Accept an invitation sent by `sender_id`
    AcceptInvite { sender_id: Uuid },

    /// Move own paddle
    KeyPressed { direction: Direction },
}

/// Countdown payload: remaining steps, the start marker, or a text notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelayValue {
    Count(u32),
    Notice(String),
}

impl DelayValue {
    /// Sentinel broadcast on the final countdown tick
    pub fn start() -> Self {
        DelayValue::Notice("Start".to_string())
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMsg {
    /// Countdown value or waiting notice
    Delay { value: DelayValue },

    /// Own paddle position
    MyPosition { y: f32 },

    /// Opponent paddle position
    PlayerPosition { y: f32 },

    /// Ball position in the receiver's frame
    NextFrame { x: f32, y: f32 },

    /// Score pair in the receiver's frame
    NewScore { this: u32, other: u32 },

    /// Opponent left mid-game; receiver wins
    EndGamePlayerQuit,

    /// Score limit reached
    EndGame { won: bool },

    /// Social notification: someone invited the receiver
    GameInvite { sender_id: Uuid, speed: SpeedTier },

    /// Social notification: an invitation was accepted, join the game
    StartGame,

    /// Error message
    Error { reason: String },
}
