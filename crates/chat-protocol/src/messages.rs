//! Wire message schema (§6). Every message is a JSON object tagged by `type`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A user's presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Active,
    Away,
    Busy,
}

/// The operation a `RESPONSE` refers back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Identify,
    NewRoom,
    Invite,
    JoinRoom,
    RoomUsers,
    RoomText,
    LeaveRoom,
    Text,
    Invalid,
}

/// Result codes carried by `RESPONSE` (§6). Not every code is valid for every
/// operation; the hub enforces that pairing, this type just names the union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseResult {
    Success,
    UserAlreadyExists,
    RoomAlreadyExists,
    NoSuchRoom,
    NoSuchUser,
    NotInvited,
    NotJoined,
    Invalid,
    NotIdentified,
}

/// Client → server messages (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Identify { username: String },
    Status { status: Status },
    Users,
    Text { username: String, text: String },
    PublicText { text: String },
    NewRoom { roomname: String },
    Invite { roomname: String, usernames: Vec<String> },
    JoinRoom { roomname: String },
    RoomUsers { roomname: String },
    RoomText { roomname: String, text: String },
    LeaveRoom { roomname: String },
    Disconnect,
}

/// Server → client messages (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Response {
        operation: Operation,
        result: ResponseResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<String>,
    },
    NewUser {
        username: String,
    },
    NewStatus {
        username: String,
        status: Status,
    },
    UserList {
        users: BTreeMap<String, Status>,
    },
    TextFrom {
        username: String,
        text: String,
    },
    PublicTextFrom {
        username: String,
        text: String,
    },
    Invitation {
        roomname: String,
        username: String,
    },
    JoinedRoom {
        roomname: String,
        username: String,
    },
    RoomUserList {
        roomname: String,
        users: BTreeMap<String, Status>,
    },
    RoomTextFrom {
        roomname: String,
        username: String,
        text: String,
    },
    LeftRoom {
        roomname: String,
        username: String,
    },
    Disconnected {
        username: String,
    },
}

impl ServerMessage {
    /// Shorthand for the common `RESPONSE{operation, result, extra}` shape.
    pub fn response(operation: Operation, result: ResponseResult, extra: Option<String>) -> Self {
        ServerMessage::Response { operation, result, extra }
    }
}
