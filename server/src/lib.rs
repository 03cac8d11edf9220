//! # Match Server Library
//!
//! The authoritative server for a small real-time multiplayer match. It accepts
//! TCP clients, registers them as players, keeps the shared match state (health,
//! kills, deaths, connection identity) and fans notifications back out.
//!
//! ## Data Flow
//!
//! ```text
//! network (read loop) -> dispatcher (decode + auth gate) -> game (match logic)
//!                                                             |
//!                                  network (writer tasks) <---+-- roster
//! ```
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Listener, per-connection read loops that frame newline-delimited JSON, and
//! per-connection writer tasks fed through [`network::ConnectionHandle`].
//!
//! ### Dispatcher Module (`dispatcher`)
//! Decodes payloads, resolves the sender from the connection's endpoint, drops
//! messages from unknown senders and invokes one match operation per message.
//!
//! ### Game Module (`game`)
//! The [`game::Match`]: lifecycle (stopped/started, optional time limit) and
//! the join, hit, kill, leave and scoreboard logic.
//!
//! ### Roster Module (`roster`)
//! The single source of truth for registered players and their counters,
//! guarded by one readers-writer lock.
//!
//! ### Player Module (`player`)
//! Player identity, health and activity state machine.
//!
//! ## Concurrency
//!
//! Every connection runs its own reader and writer task. By default each
//! received message is dispatched on a task of its own, so messages from one
//! connection may be processed out of order; [`config::DispatchMode::Ordered`]
//! dispatches inline instead. The roster is the only state shared across
//! connections.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::Match;
//! use server::network;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let game = Arc::new(Match::new(config.match_settings()));
//!     game.start();
//!
//!     // Binds 0.0.0.0:6743 and serves connections until the process exits
//!     network::listen(&config, game).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod game;
pub mod network;
pub mod player;
pub mod roster;

#[cfg(test)]
mod test_support;
