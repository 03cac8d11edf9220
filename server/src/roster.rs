//! The roster: every registered player plus their kill and death counters.
//!
//! The three maps live together in one [`RosterState`] behind a single
//! readers-writer lock, so any snapshot of players, kills and deaths taken
//! under one acquisition is mutually consistent. Every key in `players` has an
//! entry in both counter maps; they are created and removed together.
//!
//! Operations are synchronous and never await while holding the lock. Closing a
//! removed player's connection only queues a close request on its writer.

use crate::network::ConnectionHandle;
use crate::player::{Activity, Player, PlayerId};
use log::{debug, info};
use parking_lot::RwLock;
use rand::Rng;
use shared::Scores;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

/// Upper bound on digits appended while making a display name unique.
pub const MAX_RENAME_ATTEMPTS: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum JoinError {
    #[error("identity {0} is already registered")]
    DuplicateIdentity(PlayerId),
    #[error("endpoint {0} already has a registered player")]
    DuplicateEndpoint(SocketAddr),
    #[error("could not find a free name starting with {0:?}")]
    NameExhausted(String),
    #[error("match is full ({0} players)")]
    MatchFull(usize),
}

/// Result of applying damage to a registered player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub health: f32,
    /// Set only by the hit that took the player to zero.
    pub killed: bool,
}

#[derive(Debug, Default)]
struct RosterState {
    players: HashMap<PlayerId, Player>,
    kills: HashMap<PlayerId, i32>,
    deaths: HashMap<PlayerId, i32>,
}

impl RosterState {
    fn name_taken(&self, name: &str) -> bool {
        self.players.values().any(|p| p.name() == name)
    }

    fn endpoint_taken(&self, addr: SocketAddr) -> bool {
        self.players.values().any(|p| p.endpoint() == addr)
    }
}

#[derive(Debug, Default)]
pub struct Roster {
    state: RwLock<RosterState>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a player with no capacity limit.
    ///
    /// Returns the name the player was registered under, which differs from the
    /// requested one when it collided with an existing player.
    pub fn add_player(&self, player: Player) -> Result<String, JoinError> {
        self.add_player_within(player, usize::MAX)
    }

    /// Registers a player unless the roster already holds `capacity` players.
    ///
    /// Fails without mutating anything if the identity or the endpoint is
    /// already registered. A colliding name gets random decimal digits appended
    /// until it is unique.
    pub fn add_player_within(
        &self,
        mut player: Player,
        capacity: usize,
    ) -> Result<String, JoinError> {
        let mut state = self.state.write();

        if state.players.len() >= capacity {
            return Err(JoinError::MatchFull(capacity));
        }
        if state.players.contains_key(&player.id()) {
            return Err(JoinError::DuplicateIdentity(player.id()));
        }
        if state.endpoint_taken(player.endpoint()) {
            return Err(JoinError::DuplicateEndpoint(player.endpoint()));
        }

        let mut rng = rand::thread_rng();
        let mut attempts = 0;
        while state.name_taken(player.name()) {
            if attempts == MAX_RENAME_ATTEMPTS {
                return Err(JoinError::NameExhausted(player.name().to_string()));
            }
            let renamed = format!("{}{}", player.name(), rng.gen_range(0..10));
            player.set_name(renamed);
            attempts += 1;
        }

        let id = player.id();
        let name = player.name().to_string();
        info!("Registered player {} as {} from {}", id, name, player.endpoint());

        state.players.insert(id, player);
        state.kills.insert(id, 0);
        state.deaths.insert(id, 0);
        Ok(name)
    }

    /// Removes a player and both counters, closing its connection.
    pub fn remove_player(&self, id: PlayerId) -> Option<Player> {
        let mut state = self.state.write();
        let player = state.players.remove(&id)?;
        state.kills.remove(&id);
        state.deaths.remove(&id);
        player.connection().close();
        info!("Removed player {} ({})", id, player.name());
        Some(player)
    }

    /// Credits `attacker` with a kill and `victim` with a death.
    pub fn player_killed(&self, victim: PlayerId, attacker: PlayerId) {
        let mut state = self.state.write();
        *state.kills.entry(attacker).or_insert(0) += 1;
        if let Some(deaths) = state.deaths.get_mut(&victim) {
            *deaths += 1;
        }
    }

    pub fn kills(&self, id: PlayerId) -> i32 {
        self.state.read().kills.get(&id).copied().unwrap_or(0)
    }

    pub fn deaths(&self, id: PlayerId) -> i32 {
        self.state.read().deaths.get(&id).copied().unwrap_or(0)
    }

    /// Finds a player by exact name, or by endpoint when no name is given.
    ///
    /// A non-empty name always wins over the endpoint. `None` means the sender
    /// is unknown.
    pub fn lookup(&self, name: Option<&str>, endpoint: Option<SocketAddr>) -> Option<PlayerId> {
        let state = self.state.read();
        match (name.filter(|n| !n.is_empty()), endpoint) {
            (Some(name), _) => state
                .players
                .values()
                .find(|p| p.name() == name)
                .map(Player::id),
            (None, Some(addr)) => state
                .players
                .values()
                .find(|p| p.endpoint() == addr)
                .map(Player::id),
            (None, None) => None,
        }
    }

    /// Snapshot of display name -> kill count.
    pub fn scoreboard(&self) -> Scores {
        let state = self.state.read();
        state
            .players
            .iter()
            .map(|(id, p)| {
                let kills = state.kills.get(id).copied().unwrap_or(0);
                (p.name().to_string(), kills)
            })
            .collect()
    }

    /// Applies damage to a registered player.
    pub fn damage(&self, id: PlayerId, amount: f32) -> Option<DamageOutcome> {
        let mut state = self.state.write();
        let player = state.players.get_mut(&id)?;
        let killed = player.take_damage(amount);
        debug!(
            "Player {} took {:.2} damage, health now {:.2}",
            player.name(),
            amount,
            player.health()
        );
        Some(DamageOutcome {
            health: player.health(),
            killed,
        })
    }

    pub fn set_activity(&self, id: PlayerId, activity: Activity) -> bool {
        let mut state = self.state.write();
        match state.players.get_mut(&id) {
            Some(player) => player.set_activity(activity),
            None => false,
        }
    }

    /// Restores full health and `Idle`. No-op for unknown identities.
    pub fn respawn(&self, id: PlayerId) -> bool {
        let mut state = self.state.write();
        match state.players.get_mut(&id) {
            Some(player) => {
                player.respawn();
                true
            }
            None => false,
        }
    }

    /// Respawns a player and zeroes its counters.
    pub fn reset_player(&self, id: PlayerId) {
        let mut state = self.state.write();
        if let Some(player) = state.players.get_mut(&id) {
            player.respawn();
            state.kills.insert(id, 0);
            state.deaths.insert(id, 0);
        }
    }

    /// Clears every counter, then resets each registered player in turn.
    ///
    /// Each per-player reset takes the lock again, so this is not atomic with
    /// respect to concurrent joins and leaves.
    pub fn reset_all(&self) {
        {
            let mut state = self.state.write();
            state.kills = HashMap::new();
            state.deaths = HashMap::new();
        }
        for id in self.ids() {
            self.reset_player(id);
        }
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.state.read().players.keys().copied().collect()
    }

    pub fn is_identity_unique(&self, id: PlayerId) -> bool {
        !self.state.read().players.contains_key(&id)
    }

    pub fn is_endpoint_unique(&self, addr: SocketAddr) -> bool {
        !self.state.read().endpoint_taken(addr)
    }

    pub fn is_name_unique(&self, name: &str) -> bool {
        !self.state.read().name_taken(name)
    }

    pub fn name(&self, id: PlayerId) -> Option<String> {
        self.state
            .read()
            .players
            .get(&id)
            .map(|p| p.name().to_string())
    }

    pub fn health(&self, id: PlayerId) -> Option<f32> {
        self.state.read().players.get(&id).map(Player::health)
    }

    pub fn activity(&self, id: PlayerId) -> Option<Activity> {
        self.state.read().players.get(&id).map(Player::activity)
    }

    pub fn connection(&self, id: PlayerId) -> Option<ConnectionHandle> {
        self.state
            .read()
            .players
            .get(&id)
            .map(|p| p.connection().clone())
    }

    pub fn all_connections(&self) -> Vec<ConnectionHandle> {
        self.state
            .read()
            .players
            .values()
            .map(|p| p.connection().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.state.read().players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Checks that the counter maps are keyed exactly like the player map.
    pub fn counters_consistent(&self) -> bool {
        let state = self.state.read();
        state.players.len() == state.kills.len()
            && state.players.len() == state.deaths.len()
            && state
                .players
                .keys()
                .all(|id| state.kills.contains_key(id) && state.deaths.contains_key(id))
    }
}
