//! In-process chat server for integration tests.
//!
//! Speaks the real wire protocol over loopback TCP or a unix socket and keeps
//! just enough room/session state to exercise the client. A few chat texts
//! trigger misbehaviour:
//!
//! - `"hangup"`: close the connection without replying
//! - `"slow"`: reply after [`SLOW_REPLY_DELAY`] with a rejection code
//!
//! With [`ServerState::deaf_after_login`] set, a connection stops reading
//! once it has answered a login, so the client's writes eventually stall.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use chatroom_console::models::*;
use chatroom_console::net::{read_frame, write_frame, ChatClient, Endpoint};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const SLOW_REPLY_DELAY: Duration = Duration::from_millis(400);

/// Room ids handed out start here.
pub const FIRST_ROOM_ID: i32 = 7;

/// Fail the test instead of hanging when a step never completes.
pub async fn within<F: Future>(fut: F) -> F::Output {
    timeout(TEST_TIMEOUT, fut)
        .await
        .expect("test step timed out")
}

#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    pub open: bool,
    pub owner: String,
    pub members: Vec<String>,
}

#[derive(Debug)]
pub struct ServerState {
    next_token: u32,
    next_room: i32,
    pub rooms: BTreeMap<i32, Room>,
    /// Token -> room the session is in.
    pub sessions: HashMap<String, i32>,
    /// Tokens presented by login requests, in order.
    pub logins: Vec<String>,
    /// Report no resumed room on the next logins.
    pub forget_sessions: bool,
    /// Stop reading from a connection after answering its login.
    pub deaf_after_login: bool,
    pub accepted: usize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            next_token: 1,
            next_room: FIRST_ROOM_ID,
            rooms: BTreeMap::new(),
            sessions: HashMap::new(),
            logins: Vec::new(),
            forget_sessions: false,
            deaf_after_login: false,
            accepted: 0,
        }
    }
}

enum Reaction {
    Reply(Vec<ServerMessage>),
    Delayed(Duration, Vec<ServerMessage>),
    Hangup,
}

#[derive(Default)]
struct Conn {
    token: String,
    name: String,
}

fn handle(msg: ClientMessage, state: &Mutex<ServerState>, conn: &mut Conn) -> Reaction {
    let mut s = state.lock().unwrap();
    let current = s.sessions.get(&conn.token).copied().unwrap_or(0);

    let reply = match msg {
        ClientMessage::LoginReq(req) => {
            s.logins.push(req.auth.clone());
            if req.auth.is_empty() || !s.sessions.contains_key(&req.auth) {
                let token = format!("t{}", s.next_token);
                s.next_token += 1;
                s.sessions.insert(token.clone(), 0);
                conn.token = token.clone();
                ServerMessage::LoginResp(LoginResp {
                    error: ErrorCode::ErrNone,
                    auth: token,
                    cur_room_id: 0,
                })
            } else {
                conn.token = req.auth;
                if s.forget_sessions {
                    s.sessions.insert(conn.token.clone(), 0);
                }
                let cur_room_id = s.sessions[&conn.token];
                ServerMessage::LoginResp(LoginResp {
                    error: ErrorCode::ErrNone,
                    auth: String::new(),
                    cur_room_id,
                })
            }
        }
        ClientMessage::GetAllRoomListReq(_) => {
            let rooms = s
                .rooms
                .iter()
                .map(|(id, room)| RoomSettings {
                    room_id: *id,
                    room_name: Some(room.name.clone()),
                    open: Some(room.open),
                })
                .collect();
            ServerMessage::GetAllRoomListResp(GetAllRoomListResp {
                error: ErrorCode::ErrNone,
                rooms,
            })
        }
        ClientMessage::GetRoomAllMemberReq(req) => match s.rooms.get(&req.room_id) {
            Some(room) => ServerMessage::GetRoomAllMemberResp(GetRoomAllMemberResp {
                error: ErrorCode::ErrNone,
                join_names: room.members.clone(),
            }),
            None => ServerMessage::GetRoomAllMemberResp(GetRoomAllMemberResp {
                error: ErrorCode::ErrRoomIdNotExist,
                join_names: Vec::new(),
            }),
        },
        ClientMessage::CreateRoomReq(req) => {
            let id = s.next_room;
            s.next_room += 1;
            s.rooms.insert(
                id,
                Room {
                    name: req.settings.room_name.unwrap_or_default(),
                    open: req.settings.open.unwrap_or(true),
                    owner: conn.token.clone(),
                    members: Vec::new(),
                },
            );
            ServerMessage::CreateRoomResp(CreateRoomResp {
                error: ErrorCode::ErrNone,
                new_room_id: id,
            })
        }
        ClientMessage::DismissRoomReq(req) => {
            let owned = s.rooms.get(&req.room_id).map(|room| room.owner == conn.token);
            let error = match owned {
                None => ErrorCode::ErrRoomIdNotExist,
                Some(false) => ErrorCode::ErrOptDisallowedNotRoomHolder,
                Some(true) => {
                    s.rooms.remove(&req.room_id);
                    for room in s.sessions.values_mut() {
                        if *room == req.room_id {
                            *room = 0;
                        }
                    }
                    ErrorCode::ErrNone
                }
            };
            ServerMessage::DismissRoomResp(DismissRoomResp { error })
        }
        ClientMessage::ChangeRoomSettingsReq(req) => {
            let token = conn.token.clone();
            let error = match s.rooms.get_mut(&req.room_id) {
                None => ErrorCode::ErrRoomIdNotExist,
                Some(room) if room.owner != token => ErrorCode::ErrOptDisallowedNotRoomHolder,
                Some(room) => {
                    if let Some(open) = req.settings.open {
                        room.open = open;
                    }
                    ErrorCode::ErrNone
                }
            };
            ServerMessage::ChangeRoomSettingsResp(ChangeRoomSettingsResp { error })
        }
        ClientMessage::JoinRoomReq(req) => {
            let error = match s.rooms.get_mut(&req.room_id) {
                None => ErrorCode::ErrRoomIdNotExist,
                Some(room) if !room.open => ErrorCode::ErrJoinRoomClose,
                Some(room) => {
                    room.members.push(req.settings.join_name.clone());
                    ErrorCode::ErrNone
                }
            };
            let room_id = if error.is_ok() {
                conn.name = req.settings.join_name;
                s.sessions.insert(conn.token.clone(), req.room_id);
                req.room_id
            } else {
                0
            };
            ServerMessage::JoinRoomResp(JoinRoomResp { error, room_id })
        }
        ClientMessage::ChangeJoinSettingsReq(req) => {
            let old = std::mem::replace(&mut conn.name, req.settings.join_name.clone());
            let error = match s.rooms.get_mut(&req.room_id) {
                Some(room) => {
                    for member in room.members.iter_mut().filter(|m| **m == old) {
                        *member = req.settings.join_name.clone();
                    }
                    ErrorCode::ErrNone
                }
                None => ErrorCode::ErrRoomIdNotExist,
            };
            ServerMessage::ChangeJoinSettingsResp(ChangeJoinSettingsResp { error })
        }
        ClientMessage::SendInfoReq(req) => match req.info.as_str() {
            "hangup" => return Reaction::Hangup,
            "slow" => {
                return Reaction::Delayed(
                    SLOW_REPLY_DELAY,
                    vec![ServerMessage::SendInfoResp(SendInfoResp {
                        error: ErrorCode::ErrOptDisallowedNotRoomHolder,
                    })],
                )
            }
            _ if current == 0 => ServerMessage::SendInfoResp(SendInfoResp {
                error: ErrorCode::ErrRoomIdNotExist,
            }),
            _ => {
                return Reaction::Reply(vec![
                    ServerMessage::RecvInfoNtf(RecvInfoNtf {
                        room_id: current,
                        join_name: conn.name.clone(),
                        info: req.info.clone(),
                    }),
                    ServerMessage::SendInfoResp(SendInfoResp {
                        error: ErrorCode::ErrNone,
                    }),
                ])
            }
        },
        ClientMessage::ExitRoomReq(req) => {
            if let Some(room) = s.rooms.get_mut(&req.room_id) {
                room.members.retain(|m| *m != conn.name);
            }
            s.sessions.insert(conn.token.clone(), 0);
            ServerMessage::ExitRoomResp(ExitRoomResp {
                error: ErrorCode::ErrNone,
            })
        }
    };
    Reaction::Reply(vec![reply])
}

async fn serve<S>(stream: S, state: Arc<Mutex<ServerState>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut conn = Conn::default();

    loop {
        let Ok(msg) = read_frame::<ClientMessage, _>(&mut reader).await else {
            return;
        };
        let is_login = matches!(msg, ClientMessage::LoginReq(_));
        let replies = match handle(msg, &state, &mut conn) {
            Reaction::Reply(replies) => replies,
            Reaction::Delayed(delay, replies) => {
                sleep(delay).await;
                replies
            }
            Reaction::Hangup => return,
        };
        for reply in &replies {
            if write_frame(&mut writer, reply).await.is_err() {
                return;
            }
        }
        if is_login && state.lock().unwrap().deaf_after_login {
            // Hold the socket open without ever reading again
            std::future::pending::<()>().await;
        }
    }
}

pub struct MockServer {
    endpoint: Endpoint,
    state: Arc<Mutex<ServerState>>,
    accept: JoinHandle<()>,
    socket_path: Option<PathBuf>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = Arc::clone(&state);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.lock().unwrap().accepted += 1;
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });

        Self {
            endpoint: Endpoint::Tcp(addr.to_string()),
            state,
            accept,
            socket_path: None,
        }
    }

    #[cfg(unix)]
    pub async fn start_unix(path: PathBuf) -> Self {
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = Arc::clone(&state);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.lock().unwrap().accepted += 1;
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });

        Self {
            endpoint: Endpoint::Unix(path.clone()),
            state,
            accept,
            socket_path: Some(path),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    pub fn client(&self) -> ChatClient {
        ChatClient::new(self.endpoint()).with_timeout(Duration::from_secs(2))
    }

    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept.abort();
        if let Some(path) = &self.socket_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Unique socket path so parallel tests don't collide.
pub fn test_socket_path(test_name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "chatroom-test-{}-{}-{}.sock",
        test_name,
        std::process::id(),
        nanos
    ))
}

/// Captures console output for assertions.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
