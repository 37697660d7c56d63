//! The single-owner event hub (§4.4). Every mutation of chat state happens
//! on this task; everyone else talks to it through three channels.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_protocol::{
    decode_client_message, decode_envelope, encode, ClientMessage, Operation, ResponseResult,
    ServerMessage, Status,
};

use crate::connection::{ConnectionHandle, ConnectionId};

pub struct RegisterMsg {
    pub id: ConnectionId,
    pub handle: ConnectionHandle,
}

pub struct UnregisterMsg {
    pub id: ConnectionId,
    pub reason: String,
}

pub struct InboundMsg {
    pub id: ConnectionId,
    pub frame: Vec<u8>,
}

struct Room {
    members: HashSet<ConnectionId>,
    invited: HashSet<ConnectionId>,
}

pub struct Hub {
    clients: HashMap<ConnectionId, ConnectionHandle>,
    client_user: HashMap<ConnectionId, String>,
    client_status: HashMap<ConnectionId, Status>,
    username_owner: HashMap<String, ConnectionId>,
    rooms: HashMap<String, Room>,
    client_rooms: HashMap<ConnectionId, HashSet<String>>,
    register_rx: mpsc::Receiver<RegisterMsg>,
    unregister_rx: mpsc::Receiver<UnregisterMsg>,
    inbound_rx: mpsc::Receiver<InboundMsg>,
    unregister_tx: mpsc::Sender<UnregisterMsg>,
    shutdown: CancellationToken,
}

pub struct HubChannels {
    pub register_tx: mpsc::Sender<RegisterMsg>,
    pub unregister_tx: mpsc::Sender<UnregisterMsg>,
    pub inbound_tx: mpsc::Sender<InboundMsg>,
}

impl Hub {
    pub fn new(
        register_queue_depth: usize,
        unregister_queue_depth: usize,
        inbound_queue_depth: usize,
        shutdown: CancellationToken,
    ) -> (Self, HubChannels) {
        let (register_tx, register_rx) = mpsc::channel(register_queue_depth);
        let (unregister_tx, unregister_rx) = mpsc::channel(unregister_queue_depth);
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_queue_depth);
        let hub = Self {
            clients: HashMap::new(),
            client_user: HashMap::new(),
            client_status: HashMap::new(),
            username_owner: HashMap::new(),
            rooms: HashMap::new(),
            client_rooms: HashMap::new(),
            register_rx,
            unregister_rx,
            inbound_rx,
            unregister_tx: unregister_tx.clone(),
            shutdown,
        };
        (hub, HubChannels { register_tx, unregister_tx, inbound_tx })
    }

    /// Runs until cancelled. Never suspends on anything but its three
    /// channels (§5 "Suspension points").
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    self.close_all();
                    break;
                }
                msg = self.register_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_register(msg),
                        None => break,
                    }
                }
                msg = self.unregister_rx.recv() => {
                    match msg {
                        Some(msg) => self.disconnect(msg.id, msg.reason),
                        None => break,
                    }
                }
                msg = self.inbound_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_inbound(msg),
                        None => break,
                    }
                }
            }
        }
    }

    fn handle_register(&mut self, msg: RegisterMsg) {
        tracing::info!(conn_id = %msg.id, "connection registered");
        self.clients.insert(msg.id, msg.handle);
    }

    fn handle_inbound(&mut self, msg: InboundMsg) {
        let InboundMsg { id, frame } = msg;
        if !self.clients.contains_key(&id) {
            return;
        }

        let envelope = match decode_envelope(&frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(conn_id = %id, %err, "envelope decode failed");
                self.send_invalid_and_disconnect(id, Operation::Invalid, ResponseResult::Invalid);
                return;
            }
        };

        let identified = self.client_user.contains_key(&id);
        if !identified && envelope.type_name != "IDENTIFY" {
            self.send_invalid_and_disconnect(id, Operation::Invalid, ResponseResult::NotIdentified);
            return;
        }

        let message = match decode_client_message(&envelope) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(conn_id = %id, %err, "message decode/validate failed");
                self.send_invalid_and_disconnect(id, Operation::Invalid, ResponseResult::Invalid);
                return;
            }
        };

        self.dispatch(id, message);
    }

    fn dispatch(&mut self, id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Identify { username } => self.handle_identify(id, username),
            ClientMessage::Status { status } => self.handle_status(id, status),
            ClientMessage::Users => self.handle_users(id),
            ClientMessage::Text { username, text } => self.handle_text(id, username, text),
            ClientMessage::PublicText { text } => self.handle_public_text(id, text),
            ClientMessage::NewRoom { roomname } => self.handle_new_room(id, roomname),
            ClientMessage::Invite { roomname, usernames } => self.handle_invite(id, roomname, usernames),
            ClientMessage::JoinRoom { roomname } => self.handle_join_room(id, roomname),
            ClientMessage::RoomUsers { roomname } => self.handle_room_users(id, roomname),
            ClientMessage::RoomText { roomname, text } => self.handle_room_text(id, roomname, text),
            ClientMessage::LeaveRoom { roomname } => self.handle_leave_room(id, roomname),
            ClientMessage::Disconnect => self.disconnect(id, "client requested disconnect".to_owned()),
        }
    }

    fn handle_identify(&mut self, id: ConnectionId, username: String) {
        if self.username_owner.contains_key(&username) {
            self.respond(id, Operation::Identify, ResponseResult::UserAlreadyExists, Some(username));
            return;
        }
        self.client_user.insert(id, username.clone());
        self.client_status.insert(id, Status::Active);
        self.username_owner.insert(username.clone(), id);
        self.respond(id, Operation::Identify, ResponseResult::Success, Some(username.clone()));
        self.broadcast_others(id, &ServerMessage::NewUser { username });
    }

    fn handle_status(&mut self, id: ConnectionId, status: Status) {
        self.client_status.insert(id, status);
        let username = self.client_user.get(&id).cloned().unwrap_or_default();
        self.broadcast_others(id, &ServerMessage::NewStatus { username, status });
    }

    fn handle_users(&mut self, id: ConnectionId) {
        let users: BTreeMap<String, Status> = self
            .client_user
            .iter()
            .map(|(cid, name)| (name.clone(), self.client_status.get(cid).copied().unwrap_or(Status::Active)))
            .collect();
        self.send_to(id, &ServerMessage::UserList { users });
    }

    fn handle_text(&mut self, id: ConnectionId, username: String, text: String) {
        let Some(&target) = self.username_owner.get(&username) else {
            self.respond(id, Operation::Text, ResponseResult::NoSuchUser, Some(username));
            return;
        };
        let sender = self.client_user.get(&id).cloned().unwrap_or_default();
        self.send_to(target, &ServerMessage::TextFrom { username: sender, text });
    }

    fn handle_public_text(&mut self, id: ConnectionId, text: String) {
        let username = self.client_user.get(&id).cloned().unwrap_or_default();
        self.broadcast_others(id, &ServerMessage::PublicTextFrom { username, text });
    }

    fn handle_new_room(&mut self, id: ConnectionId, roomname: String) {
        if self.rooms.contains_key(&roomname) {
            self.respond(id, Operation::NewRoom, ResponseResult::RoomAlreadyExists, Some(roomname));
            return;
        }
        let mut members = HashSet::new();
        members.insert(id);
        self.rooms.insert(roomname.clone(), Room { members, invited: HashSet::new() });
        self.client_rooms.entry(id).or_default().insert(roomname.clone());
        self.respond(id, Operation::NewRoom, ResponseResult::Success, Some(roomname));
    }

    fn handle_invite(&mut self, id: ConnectionId, roomname: String, usernames: Vec<String>) {
        let Some(room) = self.rooms.get(&roomname) else {
            self.respond(id, Operation::Invite, ResponseResult::NoSuchRoom, Some(roomname));
            return;
        };
        if !room.members.contains(&id) {
            // Inviting to a room you're not in is a protocol violation, not a refusal (§4.4).
            self.send_invalid_and_disconnect(id, Operation::Invalid, ResponseResult::Invalid);
            return;
        }

        let inviter = self.client_user.get(&id).cloned().unwrap_or_default();
        let mut newly_invited = Vec::new();
        let mut unknown_username = None;
        for username in usernames {
            let Some(&target) = self.username_owner.get(&username) else {
                // Abort the rest of the list (§4.4), but the targets already
                // accumulated below must still be notified — don't `return`
                // here, or they're left invited with no INVITATION frame.
                unknown_username = Some(username);
                break;
            };
            let room = self.rooms.get_mut(&roomname).expect("room checked above");
            if room.members.contains(&target) || room.invited.contains(&target) {
                continue;
            }
            room.invited.insert(target);
            newly_invited.push(target);
        }
        for target in newly_invited {
            self.send_to(target, &ServerMessage::Invitation { roomname: roomname.clone(), username: inviter.clone() });
        }
        if let Some(username) = unknown_username {
            self.respond(id, Operation::Invite, ResponseResult::NoSuchUser, Some(username));
        }
    }

    fn handle_join_room(&mut self, id: ConnectionId, roomname: String) {
        let Some(room) = self.rooms.get_mut(&roomname) else {
            self.respond(id, Operation::JoinRoom, ResponseResult::NoSuchRoom, Some(roomname));
            return;
        };
        if room.members.contains(&id) {
            // Idempotent: no broadcast for a repeat join (§9 design notes).
            self.respond(id, Operation::JoinRoom, ResponseResult::Success, Some(roomname));
            return;
        }
        if !room.invited.remove(&id) {
            self.respond(id, Operation::JoinRoom, ResponseResult::NotInvited, Some(roomname));
            return;
        }
        room.members.insert(id);
        let members: Vec<ConnectionId> = room.members.iter().copied().collect();
        self.client_rooms.entry(id).or_default().insert(roomname.clone());

        self.respond(id, Operation::JoinRoom, ResponseResult::Success, Some(roomname.clone()));
        let username = self.client_user.get(&id).cloned().unwrap_or_default();
        for member in members {
            self.send_to(member, &ServerMessage::JoinedRoom { roomname: roomname.clone(), username: username.clone() });
        }
    }

    fn handle_room_users(&mut self, id: ConnectionId, roomname: String) {
        let Some(room) = self.rooms.get(&roomname) else {
            self.respond(id, Operation::RoomUsers, ResponseResult::NoSuchRoom, Some(roomname));
            return;
        };
        if !room.members.contains(&id) {
            self.respond(id, Operation::RoomUsers, ResponseResult::NotJoined, Some(roomname));
            return;
        }
        let users: BTreeMap<String, Status> = room
            .members
            .iter()
            .filter_map(|cid| {
                let name = self.client_user.get(cid)?.clone();
                let status = self.client_status.get(cid).copied().unwrap_or(Status::Active);
                Some((name, status))
            })
            .collect();
        self.send_to(id, &ServerMessage::RoomUserList { roomname, users });
    }

    fn handle_room_text(&mut self, id: ConnectionId, roomname: String, text: String) {
        let Some(room) = self.rooms.get(&roomname) else {
            self.respond(id, Operation::RoomText, ResponseResult::NoSuchRoom, Some(roomname));
            return;
        };
        if !room.members.contains(&id) {
            self.respond(id, Operation::RoomText, ResponseResult::NotJoined, Some(roomname));
            return;
        }
        let others: Vec<ConnectionId> = room.members.iter().copied().filter(|&m| m != id).collect();
        let username = self.client_user.get(&id).cloned().unwrap_or_default();
        for member in others {
            self.send_to(
                member,
                &ServerMessage::RoomTextFrom { roomname: roomname.clone(), username: username.clone(), text: text.clone() },
            );
        }
    }

    fn handle_leave_room(&mut self, id: ConnectionId, roomname: String) {
        let Some(room) = self.rooms.get_mut(&roomname) else {
            self.respond(id, Operation::LeaveRoom, ResponseResult::NoSuchRoom, Some(roomname));
            return;
        };
        if !room.members.remove(&id) {
            self.respond(id, Operation::LeaveRoom, ResponseResult::NotJoined, Some(roomname));
            return;
        }
        let remaining: Vec<ConnectionId> = room.members.iter().copied().collect();
        let became_empty = room.members.is_empty();
        if became_empty {
            self.rooms.remove(&roomname);
        }
        if let Some(set) = self.client_rooms.get_mut(&id) {
            set.remove(&roomname);
        }
        let username = self.client_user.get(&id).cloned().unwrap_or_default();
        for member in remaining {
            self.send_to(member, &ServerMessage::LeftRoom { roomname: roomname.clone(), username: username.clone() });
        }
    }

    /// Full disconnect flow (§4.4), also used for hub-initiated fail-closed
    /// and for explicit DISCONNECT.
    fn disconnect(&mut self, id: ConnectionId, reason: String) {
        if let Some(username) = self.client_user.remove(&id) {
            let room_names: Vec<String> = self.client_rooms.remove(&id).unwrap_or_default().into_iter().collect();
            for room_name in room_names {
                let Some(room) = self.rooms.get_mut(&room_name) else { continue };
                room.members.remove(&id);
                room.invited.remove(&id);
                let remaining: Vec<ConnectionId> = room.members.iter().copied().collect();
                let became_empty = room.members.is_empty();
                if became_empty {
                    self.rooms.remove(&room_name);
                }
                for member in remaining {
                    self.send_to(member, &ServerMessage::LeftRoom { roomname: room_name.clone(), username: username.clone() });
                }
            }
            self.username_owner.remove(&username);
            self.client_status.remove(&id);
            let others: Vec<ConnectionId> = self.client_user.keys().copied().filter(|&other| other != id).collect();
            for other in others {
                self.send_to(other, &ServerMessage::Disconnected { username: username.clone() });
            }
        } else {
            self.client_rooms.remove(&id);
        }
        if let Some(handle) = self.clients.remove(&id) {
            handle.close();
        }
        tracing::info!(conn_id = %id, reason = %reason, "connection closed");
    }

    fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.clients.keys().copied().collect();
        for id in ids {
            self.disconnect(id, "server shutting down".to_owned());
        }
    }

    fn send_invalid_and_disconnect(&mut self, id: ConnectionId, operation: Operation, result: ResponseResult) {
        self.send_to(id, &ServerMessage::response(operation, result, None));
        self.disconnect(id, format!("protocol violation: {result:?}"));
    }

    fn respond(&mut self, id: ConnectionId, operation: Operation, result: ResponseResult, extra: Option<String>) {
        self.send_to(id, &ServerMessage::response(operation, result, extra));
    }

    /// Broadcasts to every other *identified* client (§4.4's dispatch table
    /// says "to all others" for NEW_USER/NEW_STATUS/PUBLIC_TEXT_FROM; an
    /// unidentified connection never appears in any index per §3, so it is
    /// never a broadcast target).
    fn broadcast_others(&mut self, id: ConnectionId, message: &ServerMessage) {
        let others: Vec<ConnectionId> = self.client_user.keys().copied().filter(|&other| other != id).collect();
        for other in others {
            self.send_to(other, message);
        }
    }

    /// The only way the hub talks to a client. Never blocks (§5); a send
    /// failure routes through the same unregister path as a transport error.
    fn send_to(&mut self, id: ConnectionId, message: &ServerMessage) {
        let Some(handle) = self.clients.get(&id) else { return };
        if handle.send(encode(message)).is_err() {
            self.fail_closed(id);
        }
    }

    fn fail_closed(&mut self, id: ConnectionId) {
        let msg = UnregisterMsg { id, reason: "send failed".to_owned() };
        if self.unregister_tx.try_send(msg).is_err() {
            // Unregister channel itself is full: force it inline rather than
            // ever let the hub block on one client (§4.4).
            self.disconnect(id, "forced (unregister queue full)".to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_handle;

    /// A hub with no background task: tests drive `handle_inbound` and
    /// friends directly and read the resulting frames off each client's
    /// plain mpsc receiver (§4.9 — unit-testing the dispatch table without
    /// a real socket).
    fn new_hub() -> Hub {
        Hub::new(8, 8, 8, CancellationToken::new()).0
    }

    fn register(hub: &mut Hub, seq: u64) -> (ConnectionId, mpsc::Receiver<Vec<u8>>) {
        let (handle, rx) = test_handle(seq);
        let id = handle.id;
        hub.handle_register(RegisterMsg { id, handle });
        (id, rx)
    }

    fn inbound(hub: &mut Hub, id: ConnectionId, json: &str) {
        hub.handle_inbound(InboundMsg { id, frame: json.as_bytes().to_vec() });
    }

    fn next_frame(rx: &mut mpsc::Receiver<Vec<u8>>) -> serde_json::Value {
        let frame = rx.try_recv().expect("expected a frame, found none");
        serde_json::from_slice(&frame).unwrap()
    }

    fn no_more_frames(rx: &mut mpsc::Receiver<Vec<u8>>) {
        assert!(rx.try_recv().is_err(), "expected no further frames");
    }

    #[test]
    fn identify_success_does_not_broadcast_to_unidentified_connections() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (_bystander, mut bystander_rx) = register(&mut hub, 2);

        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);

        let reply = next_frame(&mut alice_rx);
        assert_eq!(reply["result"], "SUCCESS");
        no_more_frames(&mut alice_rx);
        // `bystander` never identified: it is not a broadcast target (§3
        // "unidentified connections never appear in ... any room").
        no_more_frames(&mut bystander_rx);
    }

    #[test]
    fn second_identify_broadcasts_new_user_only_to_identified_peers() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        let (_bystander, mut bystander_rx) = register(&mut hub, 3);

        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);

        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let bob_reply = next_frame(&mut bob_rx);
        assert_eq!(bob_reply["result"], "SUCCESS");

        let broadcast = next_frame(&mut alice_rx);
        assert_eq!(broadcast["type"], "NEW_USER");
        assert_eq!(broadcast["username"], "bob");
        no_more_frames(&mut alice_rx);
        no_more_frames(&mut bob_rx);
        no_more_frames(&mut bystander_rx);
    }

    #[test]
    fn duplicate_username_is_refused_and_connection_stays_open() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (other, mut other_rx) = register(&mut hub, 2);

        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);

        inbound(&mut hub, other, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let reply = next_frame(&mut other_rx);
        assert_eq!(reply["operation"], "IDENTIFY");
        assert_eq!(reply["result"], "USER_ALREADY_EXISTS");
        assert!(hub.clients.contains_key(&other), "connection must not be dropped on refusal");
    }

    #[test]
    fn invite_by_non_member_is_a_protocol_violation_and_disconnects() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (carol, mut carol_rx) = register(&mut hub, 2);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, carol, r#"{"type":"IDENTIFY","username":"carol"}"#);
        let _ = next_frame(&mut carol_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER carol

        inbound(&mut hub, alice, r#"{"type":"NEW_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut alice_rx);

        inbound(&mut hub, carol, r#"{"type":"INVITE","roomname":"r1","usernames":["dave"]}"#);
        let reply = next_frame(&mut carol_rx);
        assert_eq!(reply["operation"], "INVALID");
        assert_eq!(reply["result"], "INVALID");
        assert!(!hub.clients.contains_key(&carol), "protocol violation must disconnect the sender");
        assert!(!hub.username_owner.contains_key("carol"));
    }

    #[test]
    fn rejoining_an_existing_member_is_idempotent_and_does_not_rebroadcast() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, alice, r#"{"type":"NEW_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut alice_rx);

        inbound(&mut hub, alice, r#"{"type":"JOIN_ROOM","roomname":"r1"}"#);
        let reply = next_frame(&mut alice_rx);
        assert_eq!(reply["result"], "SUCCESS");
        no_more_frames(&mut alice_rx); // no second JOINED_ROOM broadcast
    }

    #[test]
    fn disconnect_cleans_up_room_membership_and_notifies_identified_peers_only() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        let (_bystander, mut bystander_rx) = register(&mut hub, 3);

        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let _ = next_frame(&mut bob_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER bob

        inbound(&mut hub, alice, r#"{"type":"NEW_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, alice, r#"{"type":"INVITE","roomname":"r1","usernames":["bob"]}"#);
        let _ = next_frame(&mut bob_rx); // INVITATION
        inbound(&mut hub, bob, r#"{"type":"JOIN_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut bob_rx); // RESPONSE SUCCESS
        let _ = next_frame(&mut alice_rx); // JOINED_ROOM
        let _ = next_frame(&mut bob_rx); // JOINED_ROOM

        hub.disconnect(bob, "test teardown".to_owned());

        let left = next_frame(&mut alice_rx);
        assert_eq!(left["type"], "LEFT_ROOM");
        assert_eq!(left["username"], "bob");
        let gone = next_frame(&mut alice_rx);
        assert_eq!(gone["type"], "DISCONNECTED");
        assert_eq!(gone["username"], "bob");
        no_more_frames(&mut bystander_rx);

        assert!(!hub.rooms.get("r1").unwrap().members.contains(&bob));
        assert!(!hub.username_owner.contains_key("bob"));
        assert!(!hub.clients.contains_key(&bob));
    }

    #[test]
    fn leaving_the_last_member_deletes_the_room() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, alice, r#"{"type":"NEW_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut alice_rx);

        inbound(&mut hub, alice, r#"{"type":"LEAVE_ROOM","roomname":"r1"}"#);
        assert!(!hub.rooms.contains_key("r1"), "room must be deleted once membership is empty");
        assert!(!hub.client_rooms.get(&alice).is_some_and(|set| set.contains("r1")));
    }

    #[test]
    fn invite_with_a_mix_of_valid_and_unknown_usernames_notifies_the_valid_ones() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let _ = next_frame(&mut bob_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER bob

        inbound(&mut hub, alice, r#"{"type":"NEW_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut alice_rx);

        // "bob" is valid, "ghost" is not: bob must still get INVITATION even
        // though the whole call also reports NO_SUCH_USER for "ghost".
        inbound(&mut hub, alice, r#"{"type":"INVITE","roomname":"r1","usernames":["bob","ghost"]}"#);

        let invitation = next_frame(&mut bob_rx);
        assert_eq!(invitation["type"], "INVITATION");
        assert_eq!(invitation["roomname"], "r1");
        assert_eq!(invitation["username"], "alice");
        no_more_frames(&mut bob_rx);

        let reply = next_frame(&mut alice_rx);
        assert_eq!(reply["operation"], "INVITE");
        assert_eq!(reply["result"], "NO_SUCH_USER");
        assert_eq!(reply["extra"], "ghost");
        no_more_frames(&mut alice_rx);

        assert!(hub.rooms.get("r1").unwrap().invited.contains(&bob), "bob must still be recorded as invited");
    }

    #[test]
    fn status_change_broadcasts_new_status_to_identified_peers_only() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (_bystander, mut bystander_rx) = register(&mut hub, 2);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);

        inbound(&mut hub, alice, r#"{"type":"STATUS","status":"AWAY"}"#);

        no_more_frames(&mut alice_rx); // no self-notification
        no_more_frames(&mut bystander_rx);
        assert_eq!(hub.client_status.get(&alice), Some(&Status::Away));
    }

    #[test]
    fn users_returns_a_snapshot_of_every_identified_client() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let _ = next_frame(&mut bob_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER bob

        inbound(&mut hub, alice, r#"{"type":"USERS"}"#);
        let reply = next_frame(&mut alice_rx);
        assert_eq!(reply["type"], "USER_LIST");
        assert_eq!(reply["users"]["alice"], "ACTIVE");
        assert_eq!(reply["users"]["bob"], "ACTIVE");
        no_more_frames(&mut alice_rx);
    }

    #[test]
    fn text_is_delivered_only_to_the_named_recipient() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        let (_carol, mut carol_rx) = register(&mut hub, 3);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let _ = next_frame(&mut bob_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER bob

        inbound(&mut hub, alice, r#"{"type":"TEXT","username":"bob","text":"hi"}"#);

        let delivered = next_frame(&mut bob_rx);
        assert_eq!(delivered["type"], "TEXT_FROM");
        assert_eq!(delivered["username"], "alice");
        assert_eq!(delivered["text"], "hi");
        no_more_frames(&mut bob_rx);
        no_more_frames(&mut alice_rx);
        no_more_frames(&mut carol_rx);
    }

    #[test]
    fn public_text_reaches_every_other_identified_client() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        let (_bystander, mut bystander_rx) = register(&mut hub, 3);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let _ = next_frame(&mut bob_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER bob

        inbound(&mut hub, alice, r#"{"type":"PUBLIC_TEXT","text":"hello room"}"#);

        let received = next_frame(&mut bob_rx);
        assert_eq!(received["type"], "PUBLIC_TEXT_FROM");
        assert_eq!(received["username"], "alice");
        assert_eq!(received["text"], "hello room");
        no_more_frames(&mut bob_rx);
        no_more_frames(&mut alice_rx); // no self-delivery
        no_more_frames(&mut bystander_rx);
    }

    #[test]
    fn room_users_returns_only_members_once_joined() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let _ = next_frame(&mut bob_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER bob

        inbound(&mut hub, alice, r#"{"type":"NEW_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, alice, r#"{"type":"INVITE","roomname":"r1","usernames":["bob"]}"#);
        let _ = next_frame(&mut bob_rx); // INVITATION
        inbound(&mut hub, bob, r#"{"type":"JOIN_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut bob_rx); // RESPONSE SUCCESS
        let _ = next_frame(&mut alice_rx); // JOINED_ROOM
        let _ = next_frame(&mut bob_rx); // JOINED_ROOM

        inbound(&mut hub, alice, r#"{"type":"ROOM_USERS","roomname":"r1"}"#);
        let reply = next_frame(&mut alice_rx);
        assert_eq!(reply["type"], "ROOM_USER_LIST");
        assert_eq!(reply["roomname"], "r1");
        assert_eq!(reply["users"]["alice"], "ACTIVE");
        assert_eq!(reply["users"]["bob"], "ACTIVE");
    }

    #[test]
    fn room_text_reaches_other_members_but_not_the_sender_or_outsiders() {
        let mut hub = new_hub();
        let (alice, mut alice_rx) = register(&mut hub, 1);
        let (bob, mut bob_rx) = register(&mut hub, 2);
        let (_carol, mut carol_rx) = register(&mut hub, 3);
        inbound(&mut hub, alice, r#"{"type":"IDENTIFY","username":"alice"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, bob, r#"{"type":"IDENTIFY","username":"bob"}"#);
        let _ = next_frame(&mut bob_rx);
        let _ = next_frame(&mut alice_rx); // NEW_USER bob

        inbound(&mut hub, alice, r#"{"type":"NEW_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut alice_rx);
        inbound(&mut hub, alice, r#"{"type":"INVITE","roomname":"r1","usernames":["bob"]}"#);
        let _ = next_frame(&mut bob_rx); // INVITATION
        inbound(&mut hub, bob, r#"{"type":"JOIN_ROOM","roomname":"r1"}"#);
        let _ = next_frame(&mut bob_rx); // RESPONSE SUCCESS
        let _ = next_frame(&mut alice_rx); // JOINED_ROOM
        let _ = next_frame(&mut bob_rx); // JOINED_ROOM

        inbound(&mut hub, alice, r#"{"type":"ROOM_TEXT","roomname":"r1","text":"room hi"}"#);

        let received = next_frame(&mut bob_rx);
        assert_eq!(received["type"], "ROOM_TEXT_FROM");
        assert_eq!(received["roomname"], "r1");
        assert_eq!(received["username"], "alice");
        assert_eq!(received["text"], "room hi");
        no_more_frames(&mut bob_rx);
        no_more_frames(&mut alice_rx); // no self-delivery
        no_more_frames(&mut carol_rx); // not a room member
    }
}
