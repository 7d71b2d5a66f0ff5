//! Wire models for the chatroom protocol.
//!
//! Every frame body is a JSON object whose `"type"` field names the message
//! (`login_req`, `join_room_resp`, `recv_info_ntf`, ...). Requests flow
//! client → server as [`ClientMessage`]; responses and notifications flow
//! server → client as [`ServerMessage`].
//!
//! Each request type is paired with exactly one response type through the
//! [`Request`] trait, which is what lets the router correlate replies by type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result codes embedded in every response.
///
/// Includes `Unknown` for forward-compatibility with codes a newer server adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    ErrNone,
    ErrRoomIdNotExist,
    ErrJoinRoomClose,
    ErrOptDisallowedNotRoomHolder,
    /// Forward-compatible fallback for unknown codes
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ErrorCode::ErrNone)
    }

    /// `Ok(value)` for `err_none`, otherwise the code as a rejection.
    pub fn reply<T>(self, value: T) -> Reply<T> {
        if self.is_ok() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ErrNone => "err_none",
            ErrorCode::ErrRoomIdNotExist => "err_room_id_not_exist",
            ErrorCode::ErrJoinRoomClose => "err_join_room_close",
            ErrorCode::ErrOptDisallowedNotRoomHolder => "err_opt_disallowed_not_room_holder",
            ErrorCode::Unknown => "unknown",
        }
    }

    /// Human-readable explanation shown by the console.
    pub fn describe(&self) -> &'static str {
        match self {
            ErrorCode::ErrNone => "ok",
            ErrorCode::ErrRoomIdNotExist => "the room does not exist",
            ErrorCode::ErrJoinRoomClose => "the room is closed to new members",
            ErrorCode::ErrOptDisallowedNotRoomHolder => "only the room owner can do that",
            ErrorCode::Unknown => "the server rejected the request",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.as_str())
    }
}

/// Outcome of a request the server answered: the payload, or a domain
/// rejection carried in the response's error code.
pub type Reply<T> = Result<T, ErrorCode>;

// =============================================================================
// Shared payload fragments
// =============================================================================

/// Room settings as they appear on the wire.
///
/// All fields are optional on the wire; a settings change only carries the
/// fields being changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    #[serde(default)]
    pub room_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
}

/// Per-member settings inside a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSettings {
    pub join_name: String,
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReq {
    /// Token from a previous login; empty on first run.
    #[serde(default)]
    pub auth: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllRoomListReq {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRoomAllMemberReq {
    pub room_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomReq {
    pub settings: RoomSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissRoomReq {
    pub room_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRoomSettingsReq {
    pub room_id: i32,
    pub settings: RoomSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomReq {
    pub room_id: i32,
    pub settings: JoinSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeJoinSettingsReq {
    pub room_id: i32,
    pub settings: JoinSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendInfoReq {
    pub info: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRoomReq {
    pub room_id: i32,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResp {
    #[serde(default)]
    pub error: ErrorCode,
    /// Replacement token; empty when the server keeps the current one.
    #[serde(default)]
    pub auth: String,
    /// Room the server still associates with this session, 0 if none.
    #[serde(default)]
    pub cur_room_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllRoomListResp {
    #[serde(default)]
    pub error: ErrorCode,
    #[serde(default)]
    pub rooms: Vec<RoomSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRoomAllMemberResp {
    #[serde(default)]
    pub error: ErrorCode,
    #[serde(default)]
    pub join_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomResp {
    #[serde(default)]
    pub error: ErrorCode,
    #[serde(default)]
    pub new_room_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissRoomResp {
    #[serde(default)]
    pub error: ErrorCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRoomSettingsResp {
    #[serde(default)]
    pub error: ErrorCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomResp {
    #[serde(default)]
    pub error: ErrorCode,
    /// Joined room; servers that omit it imply the requested room.
    #[serde(default)]
    pub room_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeJoinSettingsResp {
    #[serde(default)]
    pub error: ErrorCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendInfoResp {
    #[serde(default)]
    pub error: ErrorCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRoomResp {
    #[serde(default)]
    pub error: ErrorCode,
}

// =============================================================================
// Notifications
// =============================================================================

/// Chat text relayed from another member of the current room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecvInfoNtf {
    #[serde(default)]
    pub room_id: i32,
    #[serde(default)]
    pub join_name: String,
    pub info: String,
}

/// A room's settings were changed by its owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRoomSettingsNtf {
    pub room_id: i32,
    #[serde(default)]
    pub settings: RoomSettings,
}

// =============================================================================
// Envelopes
// =============================================================================

/// Every message the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    LoginReq(LoginReq),
    GetAllRoomListReq(GetAllRoomListReq),
    GetRoomAllMemberReq(GetRoomAllMemberReq),
    CreateRoomReq(CreateRoomReq),
    DismissRoomReq(DismissRoomReq),
    ChangeRoomSettingsReq(ChangeRoomSettingsReq),
    JoinRoomReq(JoinRoomReq),
    ChangeJoinSettingsReq(ChangeJoinSettingsReq),
    SendInfoReq(SendInfoReq),
    ExitRoomReq(ExitRoomReq),
}

/// Every message the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LoginResp(LoginResp),
    GetAllRoomListResp(GetAllRoomListResp),
    GetRoomAllMemberResp(GetRoomAllMemberResp),
    CreateRoomResp(CreateRoomResp),
    DismissRoomResp(DismissRoomResp),
    ChangeRoomSettingsResp(ChangeRoomSettingsResp),
    JoinRoomResp(JoinRoomResp),
    ChangeJoinSettingsResp(ChangeJoinSettingsResp),
    SendInfoResp(SendInfoResp),
    ExitRoomResp(ExitRoomResp),
    RecvInfoNtf(RecvInfoNtf),
    ChangeRoomSettingsNtf(ChangeRoomSettingsNtf),
    /// A message type this client does not know; logged and skipped.
    #[serde(other)]
    Unknown,
}

/// Type tag of a server message, used as the router key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    LoginResp,
    GetAllRoomListResp,
    GetRoomAllMemberResp,
    CreateRoomResp,
    DismissRoomResp,
    ChangeRoomSettingsResp,
    JoinRoomResp,
    ChangeJoinSettingsResp,
    SendInfoResp,
    ExitRoomResp,
    RecvInfoNtf,
    ChangeRoomSettingsNtf,
    Unknown,
}

impl MessageKind {
    /// Response kinds a caller can wait on. The router builds one slot each.
    pub const RESPONSES: [MessageKind; 10] = [
        MessageKind::LoginResp,
        MessageKind::GetAllRoomListResp,
        MessageKind::GetRoomAllMemberResp,
        MessageKind::CreateRoomResp,
        MessageKind::DismissRoomResp,
        MessageKind::ChangeRoomSettingsResp,
        MessageKind::JoinRoomResp,
        MessageKind::ChangeJoinSettingsResp,
        MessageKind::SendInfoResp,
        MessageKind::ExitRoomResp,
    ];

    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            MessageKind::RecvInfoNtf | MessageKind::ChangeRoomSettingsNtf
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::LoginResp => "login_resp",
            MessageKind::GetAllRoomListResp => "get_all_room_list_resp",
            MessageKind::GetRoomAllMemberResp => "get_room_all_member_resp",
            MessageKind::CreateRoomResp => "create_room_resp",
            MessageKind::DismissRoomResp => "dismiss_room_resp",
            MessageKind::ChangeRoomSettingsResp => "change_room_settings_resp",
            MessageKind::JoinRoomResp => "join_room_resp",
            MessageKind::ChangeJoinSettingsResp => "change_join_settings_resp",
            MessageKind::SendInfoResp => "send_info_resp",
            MessageKind::ExitRoomResp => "exit_room_resp",
            MessageKind::RecvInfoNtf => "recv_info_ntf",
            MessageKind::ChangeRoomSettingsNtf => "change_room_settings_ntf",
            MessageKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::LoginResp(_) => MessageKind::LoginResp,
            ServerMessage::GetAllRoomListResp(_) => MessageKind::GetAllRoomListResp,
            ServerMessage::GetRoomAllMemberResp(_) => MessageKind::GetRoomAllMemberResp,
            ServerMessage::CreateRoomResp(_) => MessageKind::CreateRoomResp,
            ServerMessage::DismissRoomResp(_) => MessageKind::DismissRoomResp,
            ServerMessage::ChangeRoomSettingsResp(_) => MessageKind::ChangeRoomSettingsResp,
            ServerMessage::JoinRoomResp(_) => MessageKind::JoinRoomResp,
            ServerMessage::ChangeJoinSettingsResp(_) => MessageKind::ChangeJoinSettingsResp,
            ServerMessage::SendInfoResp(_) => MessageKind::SendInfoResp,
            ServerMessage::ExitRoomResp(_) => MessageKind::ExitRoomResp,
            ServerMessage::RecvInfoNtf(_) => MessageKind::RecvInfoNtf,
            ServerMessage::ChangeRoomSettingsNtf(_) => MessageKind::ChangeRoomSettingsNtf,
            ServerMessage::Unknown => MessageKind::Unknown,
        }
    }
}

/// Unsolicited server messages, delivered to the front end in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Chat(RecvInfoNtf),
    RoomSettingsChanged(ChangeRoomSettingsNtf),
}

impl Notification {
    /// Split a notification out of a server message.
    pub fn from_message(msg: ServerMessage) -> Option<Self> {
        match msg {
            ServerMessage::RecvInfoNtf(ntf) => Some(Notification::Chat(ntf)),
            ServerMessage::ChangeRoomSettingsNtf(ntf) => {
                Some(Notification::RoomSettingsChanged(ntf))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Request/response pairing
// =============================================================================

/// A response payload that can be awaited by type.
pub trait Response: Sized {
    /// Router slot this response is delivered to.
    const KIND: MessageKind;

    /// Extract this response from a server message of the matching kind.
    fn from_message(msg: ServerMessage) -> Option<Self>;

    /// Error code embedded in the response.
    fn error(&self) -> ErrorCode;
}

/// A request paired with the one response type that answers it.
pub trait Request {
    type Response: Response;

    fn into_message(self) -> ClientMessage;
}

macro_rules! exchange {
    ($($req:ident => $resp:ident),* $(,)?) => {
        $(
            impl Request for $req {
                type Response = $resp;

                fn into_message(self) -> ClientMessage {
                    ClientMessage::$req(self)
                }
            }

            impl Response for $resp {
                const KIND: MessageKind = MessageKind::$resp;

                fn from_message(msg: ServerMessage) -> Option<Self> {
                    match msg {
                        ServerMessage::$resp(resp) => Some(resp),
                        _ => None,
                    }
                }

                fn error(&self) -> ErrorCode {
                    self.error
                }
            }
        )*
    };
}

exchange! {
    LoginReq => LoginResp,
    GetAllRoomListReq => GetAllRoomListResp,
    GetRoomAllMemberReq => GetRoomAllMemberResp,
    CreateRoomReq => CreateRoomResp,
    DismissRoomReq => DismissRoomResp,
    ChangeRoomSettingsReq => ChangeRoomSettingsResp,
    JoinRoomReq => JoinRoomResp,
    ChangeJoinSettingsReq => ChangeJoinSettingsResp,
    SendInfoReq => SendInfoResp,
    ExitRoomReq => ExitRoomResp,
}
