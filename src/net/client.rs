//! Chat client: connection lifecycle and request/response correlation.
//!
//! `ChatClient` owns the current connection generation, the session state
//! and the connectivity mode. Every request follows the same pattern: take
//! the per-type turn, write the request, then wait on the router slot for the
//! matching response type with a deadline.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::codec::encode;
use super::link::Link;
use super::read_loop;
use super::transport::{Endpoint, Transport};
use super::router::{NotificationSink, Router};
use crate::config::ClientConfig;
use crate::models::{
    ChangeJoinSettingsReq, ChangeRoomSettingsReq, CreateRoomReq, DismissRoomReq, ExitRoomReq,
    GetAllRoomListReq, GetRoomAllMemberReq, JoinRoomReq, JoinSettings, LoginReq, MessageKind,
    Notification, Reply, Request, Response, RoomSettings, SendInfoReq,
};
use crate::state::{AuthOutcome, Connectivity, ConnectivityMode, RoomInfo, Session, LOBBY};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client-side failures.
///
/// Domain rejections from the server are not errors here; they come back as
/// the inner `Err(ErrorCode)` of a [`Reply`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to open the connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// No live connection; reconnect first.
    #[error("Not connected to the server")]
    Offline,

    /// Writing the request failed. The connection is about to go offline.
    #[error("Failed to send request: {0}")]
    Send(String),

    /// The connection was released while waiting for the reply.
    #[error("Connection closed before {0} arrived")]
    Closed(MessageKind),

    /// The server did not answer in time.
    #[error("No {kind} within {}s", .timeout.as_secs_f64())]
    Timeout {
        kind: MessageKind,
        timeout: Duration,
    },

    /// Encoding failure or a reply of the wrong shape.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether the connection should be considered lost and the operator
    /// asked to reconnect.
    pub fn needs_reconnect(&self) -> bool {
        !matches!(self, ClientError::Protocol(_))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                ClientError::ConnectionFailed(err)
            }
            _ => ClientError::Send(err.to_string()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client for one chat server.
///
/// # Connection lifecycle
///
/// - [`connect`](Self::connect) opens a new generation, starts its read loop
///   and authenticates with the stored token
/// - [`release`](Self::release) closes the current generation (idempotent)
/// - [`reconnect`](Self::reconnect) is `connect` after the operator decided to
///   retry an offline session
///
/// # Example
///
/// ```ignore
/// let client = ChatClient::new("127.0.0.1:9527".parse()?);
/// client.connect().await?;
/// let rooms = client.list_rooms().await?;
/// ```
pub struct ChatClient {
    endpoint: Endpoint,
    timeout: Duration,
    /// Current connection generation, if any.
    link: Mutex<Option<Arc<Link>>>,
    /// Never held across an await.
    session: Mutex<Session>,
    connectivity: Connectivity,
    generation: AtomicU64,
    /// Serializes connect/reconnect.
    connecting: AsyncMutex<()>,
    notifications: NotificationSink,
}

impl ChatClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            link: Mutex::new(None),
            session: Mutex::new(Session::new()),
            connectivity: Connectivity::new(),
            generation: AtomicU64::new(0),
            connecting: AsyncMutex::new(()),
            notifications: NotificationSink::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.endpoint.clone()).with_timeout(config.request_timeout)
    }

    /// Set the per-request deadline. Default is 30 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Take the stream of unsolicited notifications. Only the first call gets
    /// it; the queue spans reconnects. Notifications arriving before anyone
    /// took it are dropped.
    pub fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.notifications.attach()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.mode() == ConnectivityMode::Connected
    }

    /// Snapshot of the session state.
    pub fn session(&self) -> Session {
        lock(&self.session).clone()
    }

    pub fn current_room_id(&self) -> i32 {
        lock(&self.session).current_room_id()
    }

    pub fn auth_token(&self) -> String {
        lock(&self.session).auth_token().to_string()
    }

    pub fn known_rooms(&self) -> BTreeMap<i32, RoomInfo> {
        lock(&self.session).known_rooms().clone()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a new connection generation and authenticate.
    ///
    /// Any previous generation is released first. If authentication fails or
    /// is rejected the new generation is released again.
    pub async fn connect(&self) -> Result<Reply<AuthOutcome>, ClientError> {
        let _connecting = self.connecting.lock().await;

        self.release();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (transport, reader) = Transport::open(&self.endpoint, generation).await?;
        let link = Arc::new(Link::new(transport, Router::new(self.notifications.clone())));

        *lock(&self.link) = Some(Arc::clone(&link));
        self.connectivity.mark_connected(generation);
        read_loop::spawn(Arc::clone(&link), reader, self.connectivity.clone());

        match self.authenticate().await {
            Ok(Ok(outcome)) => {
                info!(
                    generation,
                    room = outcome.current_room_id,
                    token_renewed = outcome.token_renewed,
                    "Authenticated"
                );
                Ok(Ok(outcome))
            }
            Ok(Err(code)) => {
                warn!(generation, %code, "Authentication rejected");
                self.release();
                Ok(Err(code))
            }
            Err(e) => {
                warn!(generation, error = %e, "Authentication failed");
                self.release();
                Err(e)
            }
        }
    }

    /// Operator-initiated retry after the session went offline.
    pub async fn reconnect(&self) -> Result<Reply<AuthOutcome>, ClientError> {
        info!(endpoint = %self.endpoint, "Reconnecting");
        self.connect().await
    }

    /// Send the stored token and apply the login response.
    pub async fn authenticate(&self) -> Result<Reply<AuthOutcome>, ClientError> {
        let auth = self.auth_token();
        let resp = self.call(LoginReq { auth }).await?;
        if !resp.error.is_ok() {
            return Ok(Err(resp.error));
        }

        let outcome = lock(&self.session).apply_login(&resp);
        if let Some(room) = outcome.lost_room {
            info!(room, "Server no longer holds our room; back in the lobby");
        }
        Ok(Ok(outcome))
    }

    /// Close the current connection generation.
    ///
    /// Idempotent and non-blocking: safe from the signal task and concurrent
    /// with the read loop and command layer.
    pub fn release(&self) {
        let Some(link) = lock(&self.link).clone() else {
            return;
        };
        self.release_link(&link, "connection released by client");
    }

    fn current_link(&self) -> Result<Arc<Link>, ClientError> {
        match lock(&self.link).as_ref() {
            Some(link) if !link.is_released() => Ok(Arc::clone(link)),
            _ => Err(ClientError::Offline),
        }
    }

    // =========================================================================
    // Correlation
    // =========================================================================

    /// Send `request` and wait for its typed response.
    ///
    /// The embedded error code is not inspected here; the typed wrappers below
    /// turn it into a [`Reply`].
    pub async fn call<Q: Request>(&self, request: Q) -> Result<Q::Response, ClientError> {
        let link = self.current_link()?;
        let kind = <Q::Response as Response>::KIND;

        let _turn = link
            .router
            .reserve(kind)
            .await
            .ok_or_else(|| ClientError::Protocol(format!("{} has no response slot", kind)))?;
        link.router.discard_stale(kind);

        let body = encode(&request.into_message())
            .map_err(|e| ClientError::Protocol(format!("{:#}", e)))?;

        // One deadline covers writing the request and waiting for the reply
        let mut sent = false;
        let exchange = async {
            link.transport.send(&body).await?;
            sent = true;
            debug!(generation = link.generation(), %kind, "Request sent");
            Ok::<_, ClientError>(link.router.wait(kind).await)
        };

        let outcome = timeout(self.timeout, exchange).await;
        match outcome {
            Ok(Ok(Some(msg))) => {
                let resp = Q::Response::from_message(msg).ok_or_else(|| {
                    ClientError::Protocol(format!("Unexpected reply in {} slot", kind))
                })?;
                debug!(%kind, code = %resp.error(), "Reply received");
                Ok(resp)
            }
            Ok(Ok(None)) => Err(ClientError::Closed(kind)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(%kind, timeout = ?self.timeout, sent, "No response before deadline");
                if !sent {
                    // A partly written frame leaves the stream unusable
                    self.release_link(&link, "request write timed out");
                }
                Err(ClientError::Timeout {
                    kind,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Release `link` and take its generation offline, if still current.
    fn release_link(&self, link: &Arc<Link>, reason: &str) {
        {
            let mut current = lock(&self.link);
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, link)) {
                current.take();
            }
        }
        if link.release() {
            info!(generation = link.generation(), reason, "Connection released");
        }
        self.connectivity.mark_offline(link.generation(), reason);
    }

    // =========================================================================
    // Typed operations
    // =========================================================================

    /// Fetch the room directory and replace the cached one.
    pub async fn list_rooms(&self) -> Result<Reply<BTreeMap<i32, RoomInfo>>, ClientError> {
        let resp = self.call(GetAllRoomListReq {}).await?;
        if !resp.error.is_ok() {
            return Ok(Err(resp.error));
        }

        let mut session = lock(&self.session);
        session.replace_rooms(&resp.rooms);
        Ok(Ok(session.known_rooms().clone()))
    }

    pub async fn room_members(&self, room_id: i32) -> Result<Reply<Vec<String>>, ClientError> {
        let resp = self.call(GetRoomAllMemberReq { room_id }).await?;
        Ok(resp.error.reply(resp.join_names))
    }

    /// Create a room; returns its id. Does not join it.
    pub async fn create_room(&self, name: &str, open: bool) -> Result<Reply<i32>, ClientError> {
        let resp = self
            .call(CreateRoomReq {
                settings: RoomSettings {
                    room_id: 0,
                    room_name: Some(name.to_string()),
                    open: Some(open),
                },
            })
            .await?;
        Ok(resp.error.reply(resp.new_room_id))
    }

    /// Dismiss a room the caller owns.
    pub async fn dismiss_room(&self, room_id: i32) -> Result<Reply<()>, ClientError> {
        let resp = self.call(DismissRoomReq { room_id }).await?;
        if !resp.error.is_ok() {
            return Ok(Err(resp.error));
        }
        lock(&self.session).forget_room(room_id);
        Ok(Ok(()))
    }

    /// Open or close a room to new members.
    pub async fn set_room_open(&self, room_id: i32, open: bool) -> Result<Reply<()>, ClientError> {
        let resp = self
            .call(ChangeRoomSettingsReq {
                room_id,
                settings: RoomSettings {
                    room_id,
                    room_name: None,
                    open: Some(open),
                },
            })
            .await?;
        Ok(resp.error.reply(()))
    }

    /// Join a room under `join_name`; returns the joined room id.
    pub async fn join_room(&self, room_id: i32, join_name: &str) -> Result<Reply<i32>, ClientError> {
        let resp = self
            .call(JoinRoomReq {
                room_id,
                settings: JoinSettings {
                    join_name: join_name.to_string(),
                },
            })
            .await?;
        if !resp.error.is_ok() {
            return Ok(Err(resp.error));
        }

        let joined = if resp.room_id == LOBBY {
            room_id
        } else {
            resp.room_id
        };
        lock(&self.session).enter_room(joined);
        Ok(Ok(joined))
    }

    /// Change the nickname used in a room.
    pub async fn change_join_name(
        &self,
        room_id: i32,
        join_name: &str,
    ) -> Result<Reply<()>, ClientError> {
        let resp = self
            .call(ChangeJoinSettingsReq {
                room_id,
                settings: JoinSettings {
                    join_name: join_name.to_string(),
                },
            })
            .await?;
        Ok(resp.error.reply(()))
    }

    /// Send chat text to the current room.
    pub async fn send_message(&self, info: &str) -> Result<Reply<()>, ClientError> {
        let resp = self
            .call(SendInfoReq {
                info: info.to_string(),
            })
            .await?;
        Ok(resp.error.reply(()))
    }

    /// Leave the current room. A no-op in the lobby.
    pub async fn exit_room(&self) -> Result<Reply<()>, ClientError> {
        let room_id = self.current_room_id();
        if room_id == LOBBY {
            return Ok(Ok(()));
        }

        let resp = self.call(ExitRoomReq { room_id }).await?;
        if !resp.error.is_ok() {
            return Ok(Err(resp.error));
        }
        lock(&self.session).leave_room();
        Ok(Ok(()))
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.release();
    }
}
