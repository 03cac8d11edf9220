//! Protocol dispatcher: decodes payloads, applies the authentication gate and
//! routes each message to exactly one match operation.
//!
//! The sender is resolved from the connection's endpoint, never from the
//! payload. CONNECT, DISCONNECT, PING and JOIN are accepted from anyone; every
//! other type is dropped unless the endpoint belongs to a registered player.

use crate::game::Match;
use crate::network::ConnectionHandle;
use crate::player::{Activity, Player, PlayerId};
use log::{debug, info, warn};
use shared::{DecodeError, Envelope, MessageType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("{0} dropped due to unknown sender")]
    Unauthenticated(MessageType),
    #[error("clients may not send {0} messages")]
    Unexpected(MessageType),
}

/// Entry point for the read loop: dispatches one payload and logs any drop.
pub fn handle_payload(game: &Match, conn: &ConnectionHandle, raw: &[u8]) {
    match dispatch_payload(game, conn, raw) {
        Ok(()) => {}
        Err(DispatchError::Decode(e)) => {
            warn!("Error parsing client message from {}: {}", conn.addr(), e);
        }
        Err(e) => warn!("Message from {} dropped: {}", conn.addr(), e),
    }
}

pub fn dispatch_payload(
    game: &Match,
    conn: &ConnectionHandle,
    raw: &[u8],
) -> Result<(), DispatchError> {
    let envelope = Envelope::from_slice(raw)?;
    let sender = game.roster().lookup(None, Some(conn.addr()));
    process_message(game, conn, envelope, sender)
}

/// Routes a decoded message. `sender` is `None` when the endpoint is unknown.
pub fn process_message(
    game: &Match,
    conn: &ConnectionHandle,
    envelope: Envelope,
    sender: Option<PlayerId>,
) -> Result<(), DispatchError> {
    let kind = envelope.message_type();
    debug!("Message received ({}) from {}", kind, conn.addr());

    match (envelope, sender) {
        (Envelope::Connect, _) => info!("Client connected {}", conn.addr()),
        (Envelope::Disconnect, _) => info!("Client disconnected {}", conn.addr()),
        (Envelope::Ping { nonce }, _) => game.ping(conn, nonce),
        (Envelope::Join { name, .. }, _) => {
            // The joiner already got a failure reply and the match logged why
            if let Err(e) = game.join(Player::new(name, conn.clone())) {
                debug!("Join from {} rejected: {}", conn.addr(), e);
            }
        }

        (_, None) => return Err(DispatchError::Unauthenticated(kind)),

        (Envelope::Jump, Some(id)) => game.player_action(id, Activity::Jumping),
        (Envelope::Move, Some(id)) => game.player_action(id, Activity::Moving),
        (Envelope::Fire, Some(id)) => game.player_action(id, Activity::Firing),
        (Envelope::Hit { victim, .. }, Some(id)) => game.hit(&victim, id, game.hit_damage()),
        (Envelope::Leave { .. }, Some(id)) => {
            game.remove(id);
        }
        (Envelope::Scoreboard { .. }, Some(_)) => game.send_scores(),
        (Envelope::Broadcast { content }, Some(id)) => {
            info!("Broadcast request from {}: {}", id, content);
        }
        (Envelope::Chat { to, content, .. }, Some(id)) => {
            info!("Chat from {} to {:?}: {}", id, to, content);
        }
        (Envelope::Client { .. } | Envelope::Kill { .. }, Some(_)) => {
            return Err(DispatchError::Unexpected(kind));
        }
    }
    Ok(())
}
