//! TTTP message vocabulary and its text encoding.
//!
//! Every message is a single line of text whose first token is the verb. A
//! payload, when the verb has one, follows after exactly one space. Encoding
//! goes through [`Display`](std::fmt::Display) and decoding through
//! [`FromStr`]; both are pure.

use std::fmt;
use std::str::FromStr;

use crate::types::Mark;

/// Text of the `WAITING` message sent to the first peer of a match.
pub const WAITING_TEXT: &str = "Waiting for opponent to connect";

/// Text of the `MESSAGE` sent to the first peer once its opponent arrives.
pub const YOUR_MOVE_TEXT: &str = "Your move";

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A command sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Submit a move. The index is range-checked by the match, not here.
    Move(i32),
    /// Voluntary disconnect.
    Quit,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// A message sent by the server to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Assigned mark, sent once at session start.
    Welcome(Mark),
    /// No opponent yet.
    Waiting(String),
    /// Informational text or the reason a move was rejected.
    Message(String),
    /// The peer's own move was accepted.
    ValidMove,
    /// The opponent played this cell and the game continues.
    OpponentMoved(usize),
    /// The opponent played this cell and it ended the game.
    OpponentMovedEnd(usize),
    /// The peer won.
    Victory,
    /// The peer lost.
    Defeat,
    /// The game is a draw.
    Tie,
    /// The opponent disconnected before the game ended.
    OtherPlayerLeft,
}

impl ServerMessage {
    /// Whether this message ends the game for the receiving peer.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerMessage::Victory
                | ServerMessage::Defeat
                | ServerMessage::Tie
                | ServerMessage::OtherPlayerLeft
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A line of text that is not a well-formed TTTP message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The line was empty.
    #[error("empty message")]
    Empty,
    /// The first token is not a verb of the expected direction.
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
    /// The verb requires a payload but none was given.
    #[error("{0} requires a payload")]
    MissingPayload(&'static str),
    /// The verb takes no payload but one was given.
    #[error("{0} takes no payload")]
    UnexpectedPayload(&'static str),
    /// The payload should have been an integer.
    #[error("{verb} payload {payload:?} is not an integer")]
    InvalidInteger {
        /// Verb whose payload failed to parse.
        verb: &'static str,
        /// Offending payload text.
        payload: String,
    },
    /// The `WELCOME` payload is not a mark.
    #[error(transparent)]
    InvalidMark(#[from] crate::types::InvalidMark),
}

/// Split a line into its verb and optional payload.
fn split_verb(line: &str) -> Result<(&str, Option<&str>), ProtocolError> {
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(match line.split_once(' ') {
        Some((verb, payload)) => (verb, Some(payload)),
        None => (line, None),
    })
}

fn no_payload(verb: &'static str, payload: Option<&str>) -> Result<(), ProtocolError> {
    match payload {
        None => Ok(()),
        Some(_) => Err(ProtocolError::UnexpectedPayload(verb)),
    }
}

fn required<'a>(verb: &'static str, payload: Option<&'a str>) -> Result<&'a str, ProtocolError> {
    payload.ok_or(ProtocolError::MissingPayload(verb))
}

fn integer<T: FromStr>(verb: &'static str, payload: Option<&str>) -> Result<T, ProtocolError> {
    let text = required(verb, payload)?;
    text.parse().map_err(|_| ProtocolError::InvalidInteger {
        verb,
        payload: text.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Encoding / decoding
// ---------------------------------------------------------------------------

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCommand::Move(cell) => write!(f, "MOVE {cell}"),
            ClientCommand::Quit => f.write_str("QUIT"),
        }
    }
}

impl FromStr for ClientCommand {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (verb, payload) = split_verb(line)?;
        match verb {
            "MOVE" => Ok(ClientCommand::Move(integer("MOVE", payload)?)),
            "QUIT" => no_payload("QUIT", payload).map(|()| ClientCommand::Quit),
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome(mark) => write!(f, "WELCOME {mark}"),
            ServerMessage::Waiting(text) => write!(f, "WAITING {text}"),
            ServerMessage::Message(text) => write!(f, "MESSAGE {text}"),
            ServerMessage::ValidMove => f.write_str("VALID_MOVE"),
            ServerMessage::OpponentMoved(cell) => write!(f, "OPPONENT_MOVED {cell}"),
            ServerMessage::OpponentMovedEnd(cell) => write!(f, "OPPONENT_MOVED_END {cell}"),
            ServerMessage::Victory => f.write_str("VICTORY"),
            ServerMessage::Defeat => f.write_str("DEFEAT"),
            ServerMessage::Tie => f.write_str("TIE"),
            ServerMessage::OtherPlayerLeft => f.write_str("OTHER_PLAYER_LEFT"),
        }
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (verb, payload) = split_verb(line)?;
        let message = match verb {
            "WELCOME" => ServerMessage::Welcome(required("WELCOME", payload)?.parse()?),
            "WAITING" => ServerMessage::Waiting(required("WAITING", payload)?.to_string()),
            "MESSAGE" => ServerMessage::Message(required("MESSAGE", payload)?.to_string()),
            "VALID_MOVE" => {
                no_payload("VALID_MOVE", payload)?;
                ServerMessage::ValidMove
            }
            "OPPONENT_MOVED" => ServerMessage::OpponentMoved(integer("OPPONENT_MOVED", payload)?),
            "OPPONENT_MOVED_END" => {
                ServerMessage::OpponentMovedEnd(integer("OPPONENT_MOVED_END", payload)?)
            }
            "VICTORY" => {
                no_payload("VICTORY", payload)?;
                ServerMessage::Victory
            }
            "DEFEAT" => {
                no_payload("DEFEAT", payload)?;
                ServerMessage::Defeat
            }
            "TIE" => {
                no_payload("TIE", payload)?;
                ServerMessage::Tie
            }
            "OTHER_PLAYER_LEFT" => {
                no_payload("OTHER_PLAYER_LEFT", payload)?;
                ServerMessage::OtherPlayerLeft
            }
            other => return Err(ProtocolError::UnknownVerb(other.to_string())),
        };
        Ok(message)
    }
}
