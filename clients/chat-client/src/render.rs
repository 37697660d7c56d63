//! Renders server frames as human-readable lines (§4.5). Never prints raw
//! JSON for a recognized message; unknown-but-valid types and malformed
//! frames still get a readable line instead of being swallowed silently.

use chat_protocol::{Operation, ResponseResult, ServerMessage, Status};

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Active => "ACTIVE",
        Status::Away => "AWAY",
        Status::Busy => "BUSY",
    }
}

/// Returns `true` when the rendered frame is the `IDENTIFY` success
/// response the identify-gate is waiting for; `false` for everything else,
/// including frames that failed to parse.
pub fn render(frame: &[u8]) -> bool {
    let value: serde_json::Value = match serde_json::from_slice(frame) {
        Ok(v) => v,
        Err(err) => {
            println!("[unparsable frame: {err}]");
            return false;
        }
    };

    let message: ServerMessage = match serde_json::from_value(value.clone()) {
        Ok(m) => m,
        Err(_) => {
            let type_name = value.get("type").and_then(|v| v.as_str()).unwrap_or("?");
            println!("[{type_name}] (unrecognized shape): {value}");
            return false;
        }
    };

    let identified = matches!(
        &message,
        ServerMessage::Response { operation: Operation::Identify, result: ResponseResult::Success, .. }
    );

    match message {
        ServerMessage::Response { operation, result, extra } => {
            let extra = extra.map(|e| format!(" ({e})")).unwrap_or_default();
            println!("* {operation:?} -> {result:?}{extra}");
        }
        ServerMessage::NewUser { username } => println!("* {username} has connected"),
        ServerMessage::NewStatus { username, status } => {
            println!("* {username} is now {}", status_label(status));
        }
        ServerMessage::UserList { users } => {
            println!("* users online:");
            for (username, status) in users {
                println!("    {username} [{}]", status_label(status));
            }
        }
        ServerMessage::TextFrom { username, text } => println!("{username} (private): {text}"),
        ServerMessage::PublicTextFrom { username, text } => println!("{username}: {text}"),
        ServerMessage::Invitation { roomname, username } => {
            println!("* {username} invited you to room \"{roomname}\"");
        }
        ServerMessage::JoinedRoom { roomname, username } => println!("* {username} joined room \"{roomname}\""),
        ServerMessage::RoomUserList { roomname, users } => {
            println!("* users in room \"{roomname}\":");
            for (username, status) in users {
                println!("    {username} [{}]", status_label(status));
            }
        }
        ServerMessage::RoomTextFrom { roomname, username, text } => println!("[{roomname}] {username}: {text}"),
        ServerMessage::LeftRoom { roomname, username } => println!("* {username} left room \"{roomname}\""),
        ServerMessage::Disconnected { username } => println!("* {username} has disconnected"),
    }

    identified
}
