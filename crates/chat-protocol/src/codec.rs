//! Pure protocol codec (§4.2): envelope decode, then per-type strict decode.
//!
//! Nothing here touches I/O or shared state — it only turns bytes into a
//! validated [`ClientMessage`] or back into wire bytes. The hub owns what
//! happens once a message is accepted.

use serde::Serialize;

use crate::messages::ClientMessage;
use crate::validate::{is_valid_roomname, is_valid_username};

/// Stage-1 failure: the frame isn't a well-formed envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("frame is not a JSON object")]
    InvalidJson,
    #[error("message is missing a `type` field")]
    MissingType,
    #[error("`type` field is not a string")]
    TypeNotString,
}

/// Stage-2 failure: the envelope's `type` is recognized but the body fails
/// strict decode or field validation. All variants are protocol violations
/// per §7 and carry no further detail than "malformed" — the hub only needs
/// to know to reject and disconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown message type")]
    UnknownType,
    #[error("message body does not match its declared type")]
    Malformed,
    #[error("required field is missing, empty, or out of range")]
    InvalidField,
}

/// The minimally-parsed form of a frame: its `type` tag plus the raw value,
/// ready for strict per-type decode.
pub struct Envelope {
    pub type_name: String,
    raw: serde_json::Value,
}

/// Stage 1: parse a frame as JSON and pull out a non-empty string `type`.
pub fn decode_envelope(frame: &[u8]) -> Result<Envelope, EnvelopeError> {
    let value: serde_json::Value =
        serde_json::from_slice(frame).map_err(|_| EnvelopeError::InvalidJson)?;
    let object = value.as_object().ok_or(EnvelopeError::InvalidJson)?;
    let type_value = object.get("type").ok_or(EnvelopeError::MissingType)?;
    let type_name = type_value.as_str().ok_or(EnvelopeError::TypeNotString)?;
    if type_name.is_empty() {
        return Err(EnvelopeError::MissingType);
    }
    Ok(Envelope { type_name: type_name.to_owned(), raw: value })
}

/// The wire literals recognized by [`ClientMessage`]'s `type` tag (§6).
const KNOWN_CLIENT_TYPES: &[&str] = &[
    "IDENTIFY", "STATUS", "USERS", "TEXT", "PUBLIC_TEXT", "NEW_ROOM", "INVITE", "JOIN_ROOM",
    "ROOM_USERS", "ROOM_TEXT", "LEAVE_ROOM", "DISCONNECT",
];

/// Stage 2: strict-decode an envelope into a [`ClientMessage`] and validate
/// its fields. Returns `Ok` only for a message the hub may safely act on.
pub fn decode_client_message(envelope: &Envelope) -> Result<ClientMessage, ProtocolError> {
    if !KNOWN_CLIENT_TYPES.contains(&envelope.type_name.as_str()) {
        return Err(ProtocolError::UnknownType);
    }
    let message: ClientMessage =
        serde_json::from_value(envelope.raw.clone()).map_err(|_| ProtocolError::Malformed)?;
    validate_client_message(&message)?;
    Ok(message)
}

fn validate_client_message(message: &ClientMessage) -> Result<(), ProtocolError> {
    match message {
        ClientMessage::Identify { username } => require(is_valid_username(username)),
        ClientMessage::Status { .. } => Ok(()),
        ClientMessage::Users => Ok(()),
        ClientMessage::Text { username, text } => {
            require(!username.is_empty())?;
            require(!text.is_empty())
        }
        ClientMessage::PublicText { text } => require(!text.is_empty()),
        ClientMessage::NewRoom { roomname } => require(is_valid_roomname(roomname)),
        ClientMessage::Invite { roomname, usernames } => {
            require(is_valid_roomname(roomname))?;
            require(!usernames.is_empty())?;
            require(usernames.iter().all(|u| !u.is_empty()))
        }
        ClientMessage::JoinRoom { roomname }
        | ClientMessage::RoomUsers { roomname }
        | ClientMessage::LeaveRoom { roomname } => require(is_valid_roomname(roomname)),
        ClientMessage::RoomText { roomname, text } => {
            require(is_valid_roomname(roomname))?;
            require(!text.is_empty())
        }
        ClientMessage::Disconnect => Ok(()),
    }
}

fn require(condition: bool) -> Result<(), ProtocolError> {
    if condition {
        Ok(())
    } else {
        Err(ProtocolError::InvalidField)
    }
}

/// Marshal a server-owned message to a wire frame payload (no trailing `\n`;
/// framing adds that). Infallible for well-formed server types — a failure
/// here is a programming bug, not a runtime condition to recover from.
pub fn encode<T: Serialize>(message: &T) -> Vec<u8> {
    serde_json::to_vec(message).expect("server-owned messages always serialize")
}
