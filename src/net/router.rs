//! Response router: one single-value slot per response type.
//!
//! The wire protocol carries no request id, so replies are matched to callers
//! by message type alone. That only works while at most one request of each
//! response type is in flight, so the router enforces it:
//!
//! - [`Router::reserve`] hands out a per-type turn; a second caller of the
//!   same type waits until the first one is done.
//! - [`Router::discard_stale`] empties the slot before a request is written,
//!   so a late reply to an abandoned (timed out) call is never handed to the
//!   next caller.
//! - [`Router::post`] never blocks. If a slot still holds an unread value the
//!   newer one replaces it; the dropped value is logged and counted.
//!
//! Notifications have no waiting caller and go to an ordered queue instead,
//! once a listener has attached to the [`NotificationSink`]. Before that
//! they are dropped rather than piling up.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, Notify};
use tracing::{debug, warn};

use crate::models::{MessageKind, Notification, ServerMessage};

/// What [`Router::post`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posted {
    /// Stored in an empty slot.
    Delivered,
    /// Stored, replacing an unread value.
    Replaced,
    /// Queued for the front end.
    Notified,
    /// Unknown type, closed router, or nobody listening for notifications.
    Ignored,
}

/// Shared destination for notifications, spanning connection generations.
#[derive(Debug, Clone, Default)]
pub struct NotificationSink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<Notification>>>>,
}

impl NotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink with its listener already attached.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (sink, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Notification>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach the listener. Only the first call gets the queue.
    pub fn attach(&self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        let mut tx = self.lock();
        if tx.is_some() {
            return None;
        }
        let (sender, rx) = mpsc::unbounded_channel();
        *tx = Some(sender);
        Some(rx)
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    /// Queue `notification`. `false` when nobody is listening.
    fn send(&self, notification: Notification) -> bool {
        match self.lock().as_ref() {
            Some(tx) => tx.send(notification).is_ok(),
            None => false,
        }
    }
}

#[derive(Default)]
struct SlotState {
    value: Option<ServerMessage>,
    closed: bool,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value. Returns the unread value it replaced, if any.
    fn put(&self, msg: ServerMessage) -> Result<Option<ServerMessage>, ServerMessage> {
        let replaced = {
            let mut state = self.lock();
            if state.closed {
                return Err(msg);
            }
            state.value.replace(msg)
        };
        self.notify.notify_waiters();
        Ok(replaced)
    }

    /// `Some(Some(msg))` when a value is ready, `Some(None)` when closed and
    /// drained, `None` when the caller has to wait.
    fn try_take(&self) -> Option<Option<ServerMessage>> {
        let mut state = self.lock();
        if let Some(msg) = state.value.take() {
            return Some(Some(msg));
        }
        if state.closed {
            return Some(None);
        }
        None
    }

    async fn take(&self) -> Option<ServerMessage> {
        loop {
            // Register interest before checking so a post between the check
            // and the await still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.try_take() {
                return outcome;
            }
            notified.await;
        }
    }

    fn clear(&self) -> Option<ServerMessage> {
        self.lock().value.take()
    }

    fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }
}

/// Fixed table of response slots for one connection generation.
pub struct Router {
    slots: HashMap<MessageKind, Slot>,
    turns: HashMap<MessageKind, AsyncMutex<()>>,
    notifications: NotificationSink,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Router {
    pub fn new(notifications: NotificationSink) -> Self {
        let slots = MessageKind::RESPONSES
            .iter()
            .map(|kind| (*kind, Slot::default()))
            .collect();
        let turns = MessageKind::RESPONSES
            .iter()
            .map(|kind| (*kind, AsyncMutex::new(())))
            .collect();

        Self {
            slots,
            turns,
            notifications,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Route one decoded message. Called only by the read loop.
    pub fn post(&self, msg: ServerMessage) -> Posted {
        let kind = msg.kind();

        if kind.is_notification() {
            let Some(notification) = Notification::from_message(msg) else {
                return Posted::Ignored;
            };
            if self.notifications.send(notification) {
                return Posted::Notified;
            }
            debug!(%kind, "No notification listener, dropping");
            return Posted::Ignored;
        }

        let Some(slot) = self.slots.get(&kind) else {
            debug!(%kind, "Ignoring message with no response slot");
            return Posted::Ignored;
        };

        match slot.put(msg) {
            Ok(None) => Posted::Delivered,
            Ok(Some(unread)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%kind, ?unread, "Unread response overwritten by a newer one");
                Posted::Replaced
            }
            Err(_) => {
                debug!(%kind, "Router closed, dropping response");
                Posted::Ignored
            }
        }
    }

    /// Take this caller's turn for `kind`.
    ///
    /// Returns `None` if `kind` is not a response type.
    pub async fn reserve(&self, kind: MessageKind) -> Option<AsyncMutexGuard<'_, ()>> {
        match self.turns.get(&kind) {
            Some(turn) => Some(turn.lock().await),
            None => None,
        }
    }

    /// Empty the slot for `kind`, returning whatever was left unread.
    pub fn discard_stale(&self, kind: MessageKind) -> Option<ServerMessage> {
        let stale = self.slots.get(&kind)?.clear();
        if stale.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(%kind, "Discarding stale response left by an earlier call");
        }
        stale
    }

    /// Block until a message for `kind` is posted.
    ///
    /// Returns `None` when the router is closed (connection released) or
    /// `kind` has no slot.
    pub async fn wait(&self, kind: MessageKind) -> Option<ServerMessage> {
        match self.slots.get(&kind) {
            Some(slot) => slot.take().await,
            None => None,
        }
    }

    /// Tear down every slot; all current and future waits return `None`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for slot in self.slots.values() {
            slot.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of responses that were overwritten or discarded unread.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped())
            .finish()
    }
}
