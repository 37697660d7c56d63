//! Command grammar, local validation, and message builders (§4.5, §6).

use chat_protocol::{validate, ClientMessage, Status};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: /{0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid username {0:?} (1-8 printable non-whitespace characters)")]
    InvalidUsername(String),
    #[error("invalid room name {0:?} (1-16 printable characters)")]
    InvalidRoomName(String),
    #[error("invalid status {0:?} (use ACTIVE, AWAY, or BUSY)")]
    InvalidStatus(String),
}

/// A parsed, locally-validated command. `Quit` has no wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Identify { username: String },
    Status { status: Status },
    Users,
    Msg { username: String, text: String },
    All { text: String },
    NewRoom { roomname: String },
    Invite { roomname: String, usernames: Vec<String> },
    Join { roomname: String },
    RoomUsers { roomname: String },
    RoomMsg { roomname: String, text: String },
    Leave { roomname: String },
    Disconnect,
    Quit,
}

impl Command {
    /// Whether the identify-gate (§4.5) allows this command before SUCCESS.
    pub fn allowed_before_identify(&self) -> bool {
        matches!(self, Command::Identify { .. } | Command::Quit)
    }

    pub fn into_message(self) -> Option<ClientMessage> {
        match self {
            Command::Identify { username } => Some(ClientMessage::Identify { username }),
            Command::Status { status } => Some(ClientMessage::Status { status }),
            Command::Users => Some(ClientMessage::Users),
            Command::Msg { username, text } => Some(ClientMessage::Text { username, text }),
            Command::All { text } => Some(ClientMessage::PublicText { text }),
            Command::NewRoom { roomname } => Some(ClientMessage::NewRoom { roomname }),
            Command::Invite { roomname, usernames } => Some(ClientMessage::Invite { roomname, usernames }),
            Command::Join { roomname } => Some(ClientMessage::JoinRoom { roomname }),
            Command::RoomUsers { roomname } => Some(ClientMessage::RoomUsers { roomname }),
            Command::RoomMsg { roomname, text } => Some(ClientMessage::RoomText { roomname, text }),
            Command::Leave { roomname } => Some(ClientMessage::LeaveRoom { roomname }),
            Command::Disconnect => Some(ClientMessage::Disconnect),
            Command::Quit => None,
        }
    }
}

/// Parses already-tokenized input. `tokens[0]` is the command word
/// including its leading `/`.
pub fn parse(tokens: &[String]) -> Result<Command, CommandError> {
    let (head, rest) = tokens.split_first().expect("caller only parses non-empty token lists");
    let name = head.strip_prefix('/').unwrap_or(head);

    match name {
        "identify" => {
            let [username] = rest else { return Err(CommandError::Usage("/identify <username>")) };
            require_username(username)?;
            Ok(Command::Identify { username: username.clone() })
        }
        "status" => {
            let [status] = rest else { return Err(CommandError::Usage("/status ACTIVE|AWAY|BUSY")) };
            Ok(Command::Status { status: parse_status(status)? })
        }
        "users" => {
            no_args(rest, "/users")?;
            Ok(Command::Users)
        }
        "msg" => {
            let [username, text @ ..] = rest else { return Err(CommandError::Usage("/msg <user> <text>")) };
            require_username(username)?;
            let text = join_nonempty(text, "/msg <user> <text>")?;
            Ok(Command::Msg { username: username.clone(), text })
        }
        "all" => {
            let text = join_nonempty(rest, "/all <text>")?;
            Ok(Command::All { text })
        }
        "newroom" => {
            let [roomname] = rest else { return Err(CommandError::Usage("/newroom <room>")) };
            require_roomname(roomname)?;
            Ok(Command::NewRoom { roomname: roomname.clone() })
        }
        "invite" => {
            let [roomname, usernames @ ..] = rest else {
                return Err(CommandError::Usage("/invite <room> <user> [user...]"));
            };
            require_roomname(roomname)?;
            if usernames.is_empty() {
                return Err(CommandError::Usage("/invite <room> <user> [user...]"));
            }
            for username in usernames {
                require_username(username)?;
            }
            Ok(Command::Invite { roomname: roomname.clone(), usernames: usernames.to_vec() })
        }
        "join" => {
            let [roomname] = rest else { return Err(CommandError::Usage("/join <room>")) };
            require_roomname(roomname)?;
            Ok(Command::Join { roomname: roomname.clone() })
        }
        "roomusers" => {
            let [roomname] = rest else { return Err(CommandError::Usage("/roomusers <room>")) };
            require_roomname(roomname)?;
            Ok(Command::RoomUsers { roomname: roomname.clone() })
        }
        "roommsg" => {
            let [roomname, text @ ..] = rest else { return Err(CommandError::Usage("/roommsg <room> <text>")) };
            require_roomname(roomname)?;
            let text = join_nonempty(text, "/roommsg <room> <text>")?;
            Ok(Command::RoomMsg { roomname: roomname.clone(), text })
        }
        "leave" => {
            let [roomname] = rest else { return Err(CommandError::Usage("/leave <room>")) };
            require_roomname(roomname)?;
            Ok(Command::Leave { roomname: roomname.clone() })
        }
        "disconnect" => {
            no_args(rest, "/disconnect")?;
            Ok(Command::Disconnect)
        }
        "quit" => {
            no_args(rest, "/quit")?;
            Ok(Command::Quit)
        }
        other => Err(CommandError::Unknown(other.to_owned())),
    }
}

fn require_username(username: &str) -> Result<(), CommandError> {
    if validate::is_valid_username(username) {
        Ok(())
    } else {
        Err(CommandError::InvalidUsername(username.to_owned()))
    }
}

fn require_roomname(roomname: &str) -> Result<(), CommandError> {
    if validate::is_valid_roomname(roomname) {
        Ok(())
    } else {
        Err(CommandError::InvalidRoomName(roomname.to_owned()))
    }
}

fn parse_status(token: &str) -> Result<Status, CommandError> {
    match token {
        "ACTIVE" => Ok(Status::Active),
        "AWAY" => Ok(Status::Away),
        "BUSY" => Ok(Status::Busy),
        other => Err(CommandError::InvalidStatus(other.to_owned())),
    }
}

fn no_args(rest: &[String], usage: &'static str) -> Result<(), CommandError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(CommandError::Usage(usage))
    }
}

fn join_nonempty(words: &[String], usage: &'static str) -> Result<String, CommandError> {
    if words.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(words.join(" "))
}
