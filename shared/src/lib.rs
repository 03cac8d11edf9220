//! Wire protocol shared by the match server and its clients.
//!
//! Every message is one JSON object terminated by a newline. The object always
//! carries an integer `type` plus whichever optional fields that type uses.
//! Inside the server a message is an [`Envelope`], a sum type with one variant
//! per message type; [`WireMessage`] is only the flat serde shape used at the
//! boundary.
//!
//! The sender of a message is never part of the wire form. The server derives
//! it from the connection a line arrived on, so any extra field a client adds
//! is ignored on decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 6743;
pub const MAX_HEALTH: f32 = 100.0;
pub const DEFAULT_HIT_DAMAGE: f32 = 50.0;
pub const DEFAULT_MAX_PLAYERS: usize = 20;
/// Longest accepted line, newline included. Longer lines close the connection.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Name -> kill count, ordered so the encoded scoreboard is stable.
pub type Scores = BTreeMap<String, i32>;

/// Integer message tags as they appear in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Connect = 1,
    Disconnect = 2,
    Ping = 3,
    Jump = 4,
    Move = 5,
    Fire = 6,
    Hit = 7,
    Join = 8,
    Leave = 9,
    Scoreboard = 10,
    Broadcast = 11,
    Chat = 12,
    Client = 13,
    Kill = 14,
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether a message of this type is only accepted from a registered player.
    ///
    /// CONNECT, DISCONNECT, PING and JOIN are handled before the sender is known;
    /// everything else goes through the authentication gate.
    pub fn requires_auth(self) -> bool {
        !matches!(
            self,
            MessageType::Connect | MessageType::Disconnect | MessageType::Ping | MessageType::Join
        )
    }
}

impl TryFrom<i64> for MessageType {
    type Error = DecodeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        let kind = match code {
            1 => MessageType::Connect,
            2 => MessageType::Disconnect,
            3 => MessageType::Ping,
            4 => MessageType::Jump,
            5 => MessageType::Move,
            6 => MessageType::Fire,
            7 => MessageType::Hit,
            8 => MessageType::Join,
            9 => MessageType::Leave,
            10 => MessageType::Scoreboard,
            11 => MessageType::Broadcast,
            12 => MessageType::Chat,
            13 => MessageType::Client,
            14 => MessageType::Kill,
            other => return Err(DecodeError::UnknownType(other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Connect => "CONNECT",
            MessageType::Disconnect => "DISCONNECT",
            MessageType::Ping => "PING",
            MessageType::Jump => "JUMP",
            MessageType::Move => "MOVE",
            MessageType::Fire => "FIRE",
            MessageType::Hit => "HIT",
            MessageType::Join => "JOIN",
            MessageType::Leave => "LEAVE",
            MessageType::Scoreboard => "SCOREBOARD",
            MessageType::Broadcast => "BROADCAST",
            MessageType::Chat => "CHAT",
            MessageType::Client => "CLIENT",
            MessageType::Kill => "KILL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown message type {0}")]
    UnknownType(i64),
    #[error("{kind} message is missing `{field}`")]
    MissingField {
        kind: MessageType,
        field: &'static str,
    },
}

/// Outcome carried by a JOIN reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinResult {
    Success,
    Failure,
}

impl JoinResult {
    fn as_str(self) -> &'static str {
        match self {
            JoinResult::Success => "success",
            JoinResult::Failure => "failure",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(JoinResult::Success),
            "failure" => Some(JoinResult::Failure),
            _ => None,
        }
    }
}

/// Flat JSON shape of a message. Empty fields are left out when encoding.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoreboard: Option<Scores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacker: Option<String>,
}

/// One protocol message, tagged by type, holding only the fields that type uses.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Connect,
    Disconnect,
    Ping {
        nonce: Option<String>,
    },
    Jump,
    Move,
    Fire,
    Hit {
        victim: String,
        damage: f32,
    },
    /// A join request (name only) or the server's reply to one.
    Join {
        name: String,
        identity: Option<String>,
        result: Option<JoinResult>,
    },
    Leave {
        name: Option<String>,
    },
    Scoreboard {
        scores: Scores,
    },
    Broadcast {
        content: String,
    },
    Chat {
        from: Option<String>,
        to: Option<String>,
        content: String,
    },
    Client {
        content: String,
    },
    Kill {
        attacker: String,
    },
}

impl Envelope {
    pub fn broadcast(content: impl Into<String>) -> Self {
        Envelope::Broadcast {
            content: content.into(),
        }
    }

    pub fn client(content: impl Into<String>) -> Self {
        Envelope::Client {
            content: content.into(),
        }
    }

    pub fn scoreboard(scores: Scores) -> Self {
        Envelope::Scoreboard { scores }
    }

    pub fn join_success(identity: impl Into<String>, name: impl Into<String>) -> Self {
        Envelope::Join {
            name: name.into(),
            identity: Some(identity.into()),
            result: Some(JoinResult::Success),
        }
    }

    pub fn join_failure() -> Self {
        Envelope::Join {
            name: String::new(),
            identity: None,
            result: Some(JoinResult::Failure),
        }
    }

    pub fn kill(attacker: impl Into<String>) -> Self {
        Envelope::Kill {
            attacker: attacker.into(),
        }
    }

    pub fn leave(name: impl Into<String>) -> Self {
        Envelope::Leave {
            name: Some(name.into()),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Envelope::Connect => MessageType::Connect,
            Envelope::Disconnect => MessageType::Disconnect,
            Envelope::Ping { .. } => MessageType::Ping,
            Envelope::Jump => MessageType::Jump,
            Envelope::Move => MessageType::Move,
            Envelope::Fire => MessageType::Fire,
            Envelope::Hit { .. } => MessageType::Hit,
            Envelope::Join { .. } => MessageType::Join,
            Envelope::Leave { .. } => MessageType::Leave,
            Envelope::Scoreboard { .. } => MessageType::Scoreboard,
            Envelope::Broadcast { .. } => MessageType::Broadcast,
            Envelope::Chat { .. } => MessageType::Chat,
            Envelope::Client { .. } => MessageType::Client,
            Envelope::Kill { .. } => MessageType::Kill,
        }
    }

    /// Decodes a single payload. A trailing newline is accepted.
    pub fn from_slice(raw: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireMessage = serde_json::from_slice(raw)?;
        Envelope::try_from(wire)
    }

    /// Encodes the envelope as one newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut raw = serde_json::to_vec(&WireMessage::from(self))?;
        raw.push(b'\n');
        Ok(raw)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn some_if_non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl TryFrom<WireMessage> for Envelope {
    type Error = DecodeError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let kind = MessageType::try_from(wire.kind)?;
        let envelope = match kind {
            MessageType::Connect => Envelope::Connect,
            MessageType::Disconnect => Envelope::Disconnect,
            MessageType::Ping => Envelope::Ping {
                nonce: non_empty(wire.nonce),
            },
            MessageType::Jump => Envelope::Jump,
            MessageType::Move => Envelope::Move,
            MessageType::Fire => Envelope::Fire,
            // Older clients name the victim in `name` instead of `hit_player`
            MessageType::Hit => Envelope::Hit {
                victim: non_empty(wire.hit_player)
                    .or_else(|| non_empty(wire.name))
                    .ok_or(DecodeError::MissingField {
                        kind,
                        field: "hit_player",
                    })?,
                damage: wire.damage.unwrap_or_default(),
            },
            MessageType::Join => Envelope::Join {
                name: wire.name.unwrap_or_default(),
                identity: non_empty(wire.content),
                result: wire.result.as_deref().and_then(JoinResult::parse),
            },
            MessageType::Leave => Envelope::Leave {
                name: non_empty(wire.name),
            },
            MessageType::Scoreboard => Envelope::Scoreboard {
                scores: wire.scoreboard.unwrap_or_default(),
            },
            MessageType::Broadcast => Envelope::Broadcast {
                content: wire.content.unwrap_or_default(),
            },
            MessageType::Chat => Envelope::Chat {
                from: non_empty(wire.name),
                to: non_empty(wire.message_to),
                content: wire.content.unwrap_or_default(),
            },
            MessageType::Client => Envelope::Client {
                content: wire.content.unwrap_or_default(),
            },
            MessageType::Kill => Envelope::Kill {
                attacker: wire.attacker.unwrap_or_default(),
            },
        };
        Ok(envelope)
    }
}

impl From<&Envelope> for WireMessage {
    fn from(envelope: &Envelope) -> Self {
        let mut wire = WireMessage {
            kind: i64::from(envelope.message_type().code()),
            ..WireMessage::default()
        };
        match envelope {
            Envelope::Connect
            | Envelope::Disconnect
            | Envelope::Jump
            | Envelope::Move
            | Envelope::Fire => {}
            Envelope::Ping { nonce } => wire.nonce = nonce.clone(),
            Envelope::Hit { victim, damage } => {
                wire.hit_player = some_if_non_empty(victim);
                wire.damage = Some(*damage).filter(|d| *d != 0.0);
            }
            Envelope::Join {
                name,
                identity,
                result,
            } => {
                wire.name = some_if_non_empty(name);
                wire.content = identity.clone();
                wire.result = result.map(|r| r.as_str().to_string());
            }
            Envelope::Leave { name } => wire.name = name.clone(),
            Envelope::Scoreboard { scores } => {
                if !scores.is_empty() {
                    wire.scoreboard = Some(scores.clone());
                }
            }
            Envelope::Broadcast { content } | Envelope::Client { content } => {
                wire.content = some_if_non_empty(content);
            }
            Envelope::Chat { from, to, content } => {
                wire.name = from.clone();
                wire.message_to = to.clone();
                wire.content = some_if_non_empty(content);
            }
            Envelope::Kill { attacker } => wire.attacker = some_if_non_empty(attacker),
        }
        wire
    }
}
