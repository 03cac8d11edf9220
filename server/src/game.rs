//! Match orchestration: lifecycle, join/hit/kill/leave logic and fan-out.
//!
//! A [`Match`] owns the roster for its lifetime and is shared by reference
//! (`Arc<Match>`) with every connection. Game logic mutates players only through
//! the roster and reports back to clients through their connection handles.

use crate::config::DEFAULT_MATCH_DURATION;
use crate::network::ConnectionHandle;
use crate::player::{Activity, Player, PlayerId};
use crate::roster::{JoinError, Roster};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use shared::{Envelope, DEFAULT_HIT_DAMAGE, DEFAULT_MAX_PLAYERS};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A match reports time up once this much or less of its duration remains.
pub const TIME_UP_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Stopped,
    Started,
}

#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub timed: bool,
    pub duration: Duration,
    pub max_players: usize,
    pub hit_damage: f32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            timed: false,
            duration: DEFAULT_MATCH_DURATION,
            max_players: DEFAULT_MAX_PLAYERS,
            hit_damage: DEFAULT_HIT_DAMAGE,
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: MatchState,
    started: Instant,
    epoch: u64,
}

#[derive(Debug)]
pub struct Match {
    id: Uuid,
    settings: MatchSettings,
    lifecycle: Mutex<Lifecycle>,
    roster: Roster,
}

impl Match {
    /// Creates a stopped match with an empty roster.
    pub fn new(settings: MatchSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            lifecycle: Mutex::new(Lifecycle {
                state: MatchState::Stopped,
                started: Instant::now(),
                epoch: 0,
            }),
            roster: Roster::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn hit_damage(&self) -> f32 {
        self.settings.hit_damage
    }

    pub fn state(&self) -> MatchState {
        self.lifecycle.lock().state
    }

    /// Number of times the match has been started.
    pub fn epoch(&self) -> u64 {
        self.lifecycle.lock().epoch
    }

    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.started = Instant::now();
        lifecycle.state = MatchState::Started;
        lifecycle.epoch += 1;
        info!("Match {} started (epoch {})", self.id, lifecycle.epoch);
    }

    pub fn end(&self) {
        self.lifecycle.lock().state = MatchState::Stopped;
        info!("Match {} stopped", self.id);
    }

    /// Ends the match, wipes every player's health and counters, starts again.
    pub fn reset(&self) {
        self.end();
        self.roster.reset_all();
        self.start();
    }

    /// Time left in a running timed match; `None` otherwise.
    pub fn time_remaining(&self) -> Option<Duration> {
        let lifecycle = self.lifecycle.lock();
        if !self.settings.timed || lifecycle.state != MatchState::Started {
            return None;
        }
        Some(
            self.settings
                .duration
                .saturating_sub(lifecycle.started.elapsed()),
        )
    }

    /// Reports whether a timed match has run out. Never stops the match itself.
    pub fn check_time_remaining(&self) -> bool {
        match self.time_remaining() {
            Some(remaining) if remaining <= TIME_UP_MARGIN => {
                info!("Match {} time is up", self.id);
                true
            }
            Some(remaining) => {
                debug!(
                    "Match {} has {:.2} seconds left",
                    self.id,
                    remaining.as_secs_f64()
                );
                false
            }
            None => false,
        }
    }

    /// Closes out a timed match whose time is up.
    ///
    /// Announces the end, sends the final scoreboard, then resets the match for
    /// a new epoch. Returns whether that happened.
    pub fn end_if_time_up(&self) -> bool {
        if !self.check_time_remaining() {
            return false;
        }
        self.broadcast(&Envelope::broadcast("Match over"));
        self.send_scores();
        self.reset();
        true
    }

    /// Registers a new player and announces it.
    ///
    /// The joiner always gets a JOIN reply: success with its identity and final
    /// name, or failure with both left empty. Others only hear about successes.
    pub fn join(&self, player: Player) -> Result<PlayerId, JoinError> {
        let conn = player.connection().clone();
        let id = player.id();
        let requested = player.name().to_string();

        match self
            .roster
            .add_player_within(player, self.settings.max_players)
        {
            Ok(name) => {
                let text = format!("Player {} joined", name);
                info!("{}", text);
                self.broadcast(&Envelope::broadcast(text));
                self.send_scores();
                unicast(&conn, &Envelope::join_success(id.to_string(), name));
                Ok(id)
            }
            Err(e) => {
                warn!("Player {} join failed: {}", requested, e);
                unicast(&conn, &Envelope::join_failure());
                Err(e)
            }
        }
    }

    /// Resolves the victim by name and applies damage from `attacker`.
    pub fn hit(&self, victim_name: &str, attacker: PlayerId, damage: f32) {
        debug!("Processing hit on {} by {}", victim_name, attacker);
        let Some(victim) = self.roster.lookup(Some(victim_name), None) else {
            warn!(
                "{} cannot hit non-existent player {}",
                self.display_name(attacker),
                victim_name
            );
            return;
        };

        let Some(outcome) = self.roster.damage(victim, damage) else {
            warn!("Player {} left before the hit landed", victim_name);
            return;
        };

        self.client_message(
            victim,
            &Envelope::client(format!("remaining health {:3.2}", outcome.health)),
        );

        if outcome.killed {
            self.kill(victim, attacker);
        }
    }

    /// Scores a kill, tells everyone, then respawns the victim.
    pub fn kill(&self, victim: PlayerId, attacker: PlayerId) {
        self.roster.player_killed(victim, attacker);

        let attacker_name = self.display_name(attacker);
        self.client_message(victim, &Envelope::kill(attacker_name.clone()));

        let text = format!("{} killed {}", attacker_name, self.display_name(victim));
        info!("{}", text);
        self.broadcast(&Envelope::broadcast(text));
        self.send_scores();

        self.roster.respawn(victim);
    }

    /// Sends to every registered player; returns how many sends were queued.
    ///
    /// A failed recipient is logged and skipped, never removed.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        let line = match envelope.to_line() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode {} broadcast: {}", envelope.message_type(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        for conn in self.roster.all_connections() {
            match conn.send_bytes(line.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("BROADCAST error sending to {}: {}", conn.addr(), e),
            }
        }
        delivered
    }

    pub fn send_scores(&self) {
        let scores = self.roster.scoreboard();
        debug!("Scoreboard: {:?}", scores);
        self.broadcast(&Envelope::scoreboard(scores));
    }

    /// Sends a non-chat message to one registered player.
    pub fn client_message(&self, id: PlayerId, envelope: &Envelope) {
        match self.roster.connection(id) {
            Some(conn) => unicast(&conn, envelope),
            None => warn!("CLIENT message for unknown player {} dropped", id),
        }
    }

    /// Handles a leave. Unknown identities are ignored without any broadcast.
    pub fn remove(&self, id: PlayerId) -> bool {
        let Some(player) = self.roster.remove_player(id) else {
            debug!("Ignoring leave from unknown player {}", id);
            return false;
        };

        let text = format!("Player {} left", player.name());
        info!("{}", text);
        self.broadcast(&Envelope::broadcast(text));
        self.broadcast(&Envelope::leave(player.name()));
        self.send_scores();
        true
    }

    /// Records a movement, jump or fire action.
    pub fn player_action(&self, id: PlayerId, activity: Activity) {
        if self.roster.set_activity(id, activity) {
            debug!("Player {} is {:?}", self.display_name(id), activity);
        } else {
            debug!("Ignoring {:?} from player {}", activity, id);
        }
    }

    /// Answers a ping on the connection it came from.
    pub fn ping(&self, conn: &ConnectionHandle, nonce: Option<String>) {
        debug!("Client ping from {}", conn.addr());
        unicast(conn, &Envelope::Ping { nonce });
    }

    fn display_name(&self, id: PlayerId) -> String {
        self.roster.name(id).unwrap_or_else(|| id.to_string())
    }
}

fn unicast(conn: &ConnectionHandle, envelope: &Envelope) {
    if let Err(e) = conn.send_message(envelope) {
        warn!("CLIENT error sending to {}: {}", conn.addr(), e);
    }
}
