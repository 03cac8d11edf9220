//! Per-player state: identity, display name, health and activity.
//!
//! A [`Player`] is built from a JOIN and then handed to the roster, which owns
//! it from that point on. All mutation after registration goes through the
//! roster so health changes stay atomic with the kill/death counters.

use crate::network::ConnectionHandle;
use shared::MAX_HEALTH;
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Identity minted at join time. Never the nil UUID, which means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new() -> Self {
        loop {
            let id = Uuid::new_v4();
            if !id.is_nil() {
                return Self(id);
            }
        }
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the player last reported doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Moving,
    Jumping,
    Firing,
    Dead,
}

#[derive(Debug, Clone)]
pub struct Player {
    id: PlayerId,
    name: String,
    health: f32,
    activity: Activity,
    connection: ConnectionHandle,
}

impl Player {
    /// Creates a fresh player at full health with a newly minted identity.
    pub fn new(name: impl Into<String>, connection: ConnectionHandle) -> Self {
        Self::with_id(PlayerId::new(), name, connection)
    }

    pub fn with_id(id: PlayerId, name: impl Into<String>, connection: ConnectionHandle) -> Self {
        Self {
            id,
            name: name.into(),
            health: MAX_HEALTH,
            activity: Activity::Idle,
            connection,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.connection.addr()
    }

    pub fn is_dead(&self) -> bool {
        self.activity == Activity::Dead
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Applies damage, clamping health at zero. Negative amounts count as zero.
    ///
    /// Returns true only on the hit that moves the player into `Dead`. A player
    /// that is already dead takes no further damage.
    pub(crate) fn take_damage(&mut self, amount: f32) -> bool {
        if self.is_dead() {
            return false;
        }
        self.health = (self.health - amount.max(0.0)).max(0.0);
        if self.health <= 0.0 {
            self.activity = Activity::Dead;
            return true;
        }
        false
    }

    /// Records a movement/jump/fire action. Ignored while dead.
    pub(crate) fn set_activity(&mut self, activity: Activity) -> bool {
        if self.is_dead() || activity == Activity::Dead {
            return false;
        }
        self.activity = activity;
        true
    }

    pub(crate) fn respawn(&mut self) {
        self.health = MAX_HEALTH;
        self.activity = Activity::Idle;
    }
}
