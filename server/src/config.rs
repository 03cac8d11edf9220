//! Runtime configuration for the match server.

use crate::game::MatchSettings;
use shared::{DEFAULT_HIT_DAMAGE, DEFAULT_MAX_PLAYERS, DEFAULT_PORT};
use std::time::Duration;

/// Duration recorded for untimed matches.
pub const DEFAULT_MATCH_DURATION: Duration = Duration::from_secs(300);

/// How often the match timer polls the time check.
pub const MATCH_TIMER_INTERVAL: Duration = Duration::from_secs(1);

/// How a connection's messages are handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Each message is dispatched on its own task; arrival order is not preserved.
    Concurrent,
    /// Messages are dispatched inline by the read loop, in arrival order.
    Ordered,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_players: usize,
    pub hit_damage: f32,
    /// Set when the match runs against a clock.
    pub time_limit: Option<Duration>,
    pub dispatch: DispatchMode,
    /// Remove a player whose connection drops without sending LEAVE.
    pub reap_on_disconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_players: DEFAULT_MAX_PLAYERS,
            hit_damage: DEFAULT_HIT_DAMAGE,
            time_limit: None,
            dispatch: DispatchMode::Concurrent,
            reap_on_disconnect: false,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            timed: self.time_limit.is_some(),
            duration: self.time_limit.unwrap_or(DEFAULT_MATCH_DURATION),
            max_players: self.max_players,
            hit_damage: self.hit_damage,
        }
    }
}
