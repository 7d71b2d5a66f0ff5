//! Session facts that survive reconnects within one process run.

use std::collections::BTreeMap;

use crate::models::{LoginResp, RoomSettings};

/// Room id meaning "not in a room".
pub const LOBBY: i32 = 0;

/// Cached description of a room from the last directory fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub name: String,
    /// Whether new members may join.
    pub open: bool,
}

/// What a login response changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthOutcome {
    /// The server issued a new token and it replaced the stored one.
    pub token_renewed: bool,
    /// Room the session is in after the login.
    pub current_room_id: i32,
    /// Room the client believed it was in but the server no longer associates
    /// with this session. The operator needs to rejoin.
    pub lost_room: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    auth_token: String,
    current_room_id: i32,
    known_rooms: BTreeMap<i32, RoomInfo>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn current_room_id(&self) -> i32 {
        self.current_room_id
    }

    pub fn in_room(&self) -> bool {
        self.current_room_id != LOBBY
    }

    pub fn known_rooms(&self) -> &BTreeMap<i32, RoomInfo> {
        &self.known_rooms
    }

    pub fn knows_room(&self, room_id: i32) -> bool {
        self.known_rooms.contains_key(&room_id)
    }

    /// Apply a successful login response.
    pub fn apply_login(&mut self, resp: &LoginResp) -> AuthOutcome {
        let token_renewed = !resp.auth.is_empty() && resp.auth != self.auth_token;
        if !resp.auth.is_empty() {
            self.auth_token = resp.auth.clone();
        }

        let mut lost_room = None;
        if resp.cur_room_id == LOBBY {
            if self.in_room() {
                lost_room = Some(self.current_room_id);
                self.current_room_id = LOBBY;
            }
        } else {
            self.current_room_id = resp.cur_room_id;
        }

        AuthOutcome {
            token_renewed,
            current_room_id: self.current_room_id,
            lost_room,
        }
    }

    pub fn enter_room(&mut self, room_id: i32) {
        self.current_room_id = room_id;
    }

    /// Back to the lobby; returns the room that was left.
    pub fn leave_room(&mut self) -> i32 {
        std::mem::replace(&mut self.current_room_id, LOBBY)
    }

    /// Replace the room directory wholesale with a fresh listing.
    pub fn replace_rooms(&mut self, rooms: &[RoomSettings]) {
        self.known_rooms = rooms
            .iter()
            .map(|room| {
                (
                    room.room_id,
                    RoomInfo {
                        name: room.room_name.clone().unwrap_or_default(),
                        open: room.open.unwrap_or(false),
                    },
                )
            })
            .collect();
    }

    /// Drop a dismissed room from the cache, leaving it if we were inside.
    pub fn forget_room(&mut self, room_id: i32) {
        self.known_rooms.remove(&room_id);
        if self.current_room_id == room_id {
            self.current_room_id = LOBBY;
        }
    }
}
