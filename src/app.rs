//! Console application state and command handling.
//!
//! `App` reads command lines, turns them into [`Action`]s and drives the
//! [`ChatClient`]. Notifications are printed by a separate task so chat lines
//! show up while the operator is typing.

use std::fmt::Display;
use std::future::Future;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use crossterm::style::Stylize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{ErrorCode, Notification};
use crate::net::{ChatClient, ClientError};
use crate::state::{help, parse, Action, AuthOutcome, LinkStatus, LOBBY};

pub const FAREWELL: &str = "Goodbye, see you next time";

pub const LOST_ROOM_NOTICE: &str = "You were away too long, please rejoin the room";

/// Prompt shown while waiting for a command.
pub fn prompt(room_id: i32) -> String {
    if room_id == LOBBY {
        "lobby> ".to_string()
    } else {
        format!("room {}> ", room_id)
    }
}

/// One printable line for a notification, stamped with `at`.
pub fn format_notification<Tz: TimeZone>(ntf: &Notification, at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    let stamp = at.format("%H:%M:%S");
    match ntf {
        Notification::Chat(chat) => format!(
            "[{}] [room {}] {}: {}",
            stamp,
            chat.room_id,
            chat.join_name,
            chat.info.trim_end()
        ),
        Notification::RoomSettingsChanged(change) => {
            let mut parts = Vec::new();
            if let Some(name) = &change.settings.room_name {
                parts.push(format!("renamed to \"{}\"", name));
            }
            match change.settings.open {
                Some(true) => parts.push("now open".to_string()),
                Some(false) => parts.push("now closed".to_string()),
                None => {}
            }
            if parts.is_empty() {
                parts.push("settings changed".to_string());
            }
            format!("[{}] [room {}] {}", stamp, change.room_id, parts.join(", "))
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// Line-oriented console output shared with the notification printer.
#[derive(Clone)]
pub struct Output {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn writer(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn line(&self, text: impl Display) -> io::Result<()> {
        let mut w = self.writer();
        writeln!(w, "{}", text)?;
        w.flush()
    }

    /// Print without a trailing newline.
    pub fn prompt(&self, text: impl Display) -> io::Result<()> {
        let mut w = self.writer();
        write!(w, "{}", text)?;
        w.flush()
    }

    /// Print `text` over the current prompt line, then redraw the prompt.
    pub fn interject(&self, text: impl Display, prompt: &str) -> io::Result<()> {
        let mut w = self.writer();
        write!(w, "\r{}\n{}", text, prompt)?;
        w.flush()
    }
}

/// Print notifications as they arrive until the queue closes.
pub fn spawn_notification_printer(
    client: &Arc<ChatClient>,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    out: Output,
) -> JoinHandle<()> {
    let client: Weak<ChatClient> = Arc::downgrade(client);
    tokio::spawn(async move {
        while let Some(ntf) = notifications.recv().await {
            debug!(?ntf, "Notification");
            let text = format_notification(&ntf, &Local::now());
            let styled = match ntf {
                Notification::Chat(_) => text.cyan(),
                Notification::RoomSettingsChanged(_) => text.yellow(),
            };
            let room = client
                .upgrade()
                .map(|c| c.current_room_id())
                .unwrap_or(LOBBY);
            if out.interject(styled, &prompt(room)).is_err() {
                break;
            }
        }
    })
}

/// Wait for `shutdown`, then release the connection and say goodbye.
///
/// The caller decides what happens to the process afterwards.
pub async fn release_on_shutdown<F>(shutdown: F, client: Arc<ChatClient>, out: Output)
where
    F: Future<Output = ()>,
{
    shutdown.await;
    info!("Shutdown signal received");
    client.release();
    if let Err(e) = out.line(format!("\r{}", FAREWELL)) {
        debug!(error = %e, "Could not print farewell");
    }
}

// =============================================================================
// App
// =============================================================================

/// What the input loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Error)]
enum CommandError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Input closed")]
    EndOfInput,
}

type CommandResult = Result<(), CommandError>;

enum Input {
    Line(Option<String>),
    Offline(Option<String>),
}

/// Interactive console over any line source.
pub struct App<R> {
    client: Arc<ChatClient>,
    input: Lines<BufReader<R>>,
    out: Output,
    status: watch::Receiver<LinkStatus>,
}

impl<R: AsyncRead + Unpin> App<R> {
    pub fn new(client: Arc<ChatClient>, input: R, out: Output) -> Self {
        let status = client.connectivity().subscribe();
        Self {
            client,
            input: BufReader::new(input).lines(),
            out,
            status,
        }
    }

    pub fn client(&self) -> &Arc<ChatClient> {
        &self.client
    }

    /// Initial connection. A failure is reported and left to [`run`](Self::run),
    /// which offers to reconnect.
    pub async fn connect(&mut self) -> Result<()> {
        self.out
            .line(format!("Connecting to {} ...", self.client.endpoint()))?;
        match self.client.connect().await {
            Ok(Ok(outcome)) => self.report_login(&outcome)?,
            Ok(Err(code)) => self
                .out
                .line(format!("Authentication rejected: {}", code).red())?,
            Err(e) => self
                .out
                .line(format!("Could not connect to the server: {}", e).red())?,
        }
        Ok(())
    }

    /// Read and execute commands until `quit`, end of input, or the operator
    /// declines to reconnect. Releases the connection on the way out.
    pub async fn run(&mut self) -> Result<()> {
        self.out
            .line("Welcome to the chatroom, type help for the command list".bold())?;

        loop {
            if !self.client.is_connected() {
                if self.offer_reconnect().await? {
                    continue;
                }
                break;
            }

            self.out.prompt(prompt(self.client.current_room_id()))?;
            let input = tokio::select! {
                line = self.input.next_line() => Input::Line(line?),
                status = self.status.wait_for(|s| !s.is_connected()) => {
                    Input::Offline(status.ok().and_then(|s| s.reason.clone()))
                }
            };

            match input {
                Input::Offline(reason) => {
                    let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                    self.out.line("")?;
                    self.out
                        .line(format!("Lost connection to the server: {}", reason).red())?;
                }
                Input::Line(None) => break,
                Input::Line(Some(line)) => match parse(&line) {
                    Ok(None) => {}
                    Ok(Some(action)) => {
                        if self.update(action).await? == Flow::Quit {
                            break;
                        }
                    }
                    Err(e) => self.out.line(e.to_string().yellow())?,
                },
            }
        }

        self.client.release();
        self.out.line(FAREWELL)?;
        info!("Console exited");
        Ok(())
    }

    /// Execute one action.
    pub async fn update(&mut self, action: Action) -> Result<Flow> {
        debug!(?action, "Console action");
        let outcome = match action {
            Action::Help => self.out.prompt(help::render()).map_err(CommandError::from),
            Action::List => self.list().await,
            Action::MakeRoom { name, open } => self.make_room(&name, open).await,
            Action::Enter(room_id) => self.enter(room_id).await,
            Action::Leave => self.leave().await,
            Action::Send => self.send().await,
            Action::SetOpen(open) => self.set_open(open).await,
            Action::Dismiss(room_id) => self.dismiss(room_id).await,
            Action::Quit => return Ok(Flow::Quit),
        };

        match outcome {
            Ok(()) => Ok(Flow::Continue),
            Err(CommandError::Client(e)) => self.on_client_error(e).await,
            Err(CommandError::Io(e)) => Err(e.into()),
            Err(CommandError::EndOfInput) => Ok(Flow::Quit),
        }
    }

    /// Ask until the operator answers y or n. `true` once a new connection is
    /// authenticated.
    async fn offer_reconnect(&mut self) -> Result<bool> {
        loop {
            self.out.prompt("Reconnect to the server? [y/n] ")?;
            let Some(answer) = self.input.next_line().await? else {
                return Ok(false);
            };
            match answer.trim() {
                "y" | "Y" | "yes" => {}
                "n" | "N" | "no" => return Ok(false),
                _ => {
                    self.out.line("Please answer y or n")?;
                    continue;
                }
            }

            match self.client.reconnect().await {
                Ok(Ok(outcome)) => {
                    self.report_login(&outcome)?;
                    return Ok(true);
                }
                Ok(Err(code)) => self
                    .out
                    .line(format!("Authentication rejected: {}", code).red())?,
                Err(e) => self.out.line(format!("Reconnect failed: {}", e).red())?,
            }
        }
    }

    fn report_login(&self, outcome: &AuthOutcome) -> io::Result<()> {
        self.out
            .line(format!("Hello, {}", self.client.auth_token()).green())?;
        if let Some(room) = outcome.lost_room {
            info!(room, "Room membership was not resumed");
            self.out.line(LOST_ROOM_NOTICE.yellow())?;
        }
        if outcome.current_room_id != LOBBY {
            self.out
                .line(format!("Back in room {}", outcome.current_room_id))?;
        }
        Ok(())
    }

    async fn on_client_error(&mut self, err: ClientError) -> Result<Flow> {
        warn!(error = %err, "Request could not complete");
        self.out
            .line(format!("Request could not complete: {}", err).red())?;

        // Offline is picked up by the input loop; a timeout leaves the
        // connection nominally up, so ask here.
        if !err.needs_reconnect() || !self.client.is_connected() {
            return Ok(Flow::Continue);
        }
        Ok(if self.offer_reconnect().await? {
            Flow::Continue
        } else {
            Flow::Quit
        })
    }

    fn rejected(&self, what: impl Display, code: ErrorCode) -> io::Result<()> {
        self.out.line(format!("{}: {}", what, code).yellow())
    }

    async fn ask(&mut self, question: &str) -> Result<String, CommandError> {
        self.out.prompt(question)?;
        self.input
            .next_line()
            .await?
            .ok_or(CommandError::EndOfInput)
    }

    fn require_room(&self) -> io::Result<Option<i32>> {
        let room_id = self.client.current_room_id();
        if room_id == LOBBY {
            self.out.line("You are not in a room")?;
            return Ok(None);
        }
        Ok(Some(room_id))
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn list(&mut self) -> CommandResult {
        match self.client.list_rooms().await? {
            Ok(rooms) => {
                self.out.line("Rooms (id, name, joinable):".bold())?;
                if rooms.is_empty() {
                    self.out.line("  (none)")?;
                }
                for (id, room) in &rooms {
                    let joinable = if room.open {
                        "open".green()
                    } else {
                        "closed".red()
                    };
                    self.out
                        .line(format!("{:>5}  {}  {}", id, room.name, joinable))?;
                }
            }
            Err(code) => self.rejected("Listing rooms failed", code)?,
        }

        let room_id = self.client.current_room_id();
        if room_id != LOBBY {
            match self.client.room_members(room_id).await? {
                Ok(names) => {
                    self.out
                        .line(format!("Members of room {}:", room_id).bold())?;
                    for name in names {
                        self.out.line(format!("  {}", name))?;
                    }
                }
                Err(code) => self.rejected("Listing members failed", code)?,
            }
        }
        Ok(())
    }

    async fn make_room(&mut self, name: &str, open: bool) -> CommandResult {
        match self.client.create_room(name, open).await? {
            Ok(room_id) => {
                info!(room_id, name, open, "Room created");
                self.out.line(format!("Created room {}", room_id))?;
                self.enter(room_id).await
            }
            Err(code) => Ok(self.rejected("Creating the room failed", code)?),
        }
    }

    async fn enter(&mut self, room_id: i32) -> CommandResult {
        if room_id == self.client.current_room_id() {
            let name = self.ask("New nickname: ").await?;
            let name = name.trim();
            if name.is_empty() {
                self.out.line("Nickname unchanged")?;
                return Ok(());
            }
            match self.client.change_join_name(room_id, name).await? {
                Ok(()) => self.out.line(format!("You are now {}", name))?,
                Err(code) => self.rejected("Changing nickname failed", code)?,
            }
            return Ok(());
        }

        // Check against the server's current directory, not a stale one
        if let Err(code) = self.client.list_rooms().await? {
            return Ok(self.rejected("Listing rooms failed", code)?);
        }
        if !self.client.known_rooms().contains_key(&room_id) {
            self.out.line(format!("There is no room {}", room_id))?;
            return Ok(());
        }

        let name = self.ask("Your nickname in this room: ").await?;
        let name = name.trim();
        if name.is_empty() {
            self.out.line("Join cancelled")?;
            return Ok(());
        }
        match self.client.join_room(room_id, name).await? {
            Ok(joined) => self.out.line(format!("Joined room {}", joined).green())?,
            Err(code) => self.rejected(format_args!("Could not join room {}", room_id), code)?,
        }
        Ok(())
    }

    async fn leave(&mut self) -> CommandResult {
        let Some(room_id) = self.require_room()? else {
            return Ok(());
        };
        match self.client.exit_room().await? {
            Ok(()) => self.out.line(format!("Left room {}", room_id))?,
            Err(code) => self.rejected("Leaving the room failed", code)?,
        }
        Ok(())
    }

    async fn send(&mut self) -> CommandResult {
        if self.require_room()?.is_none() {
            return Ok(());
        }
        let text = self.ask("Message: ").await?;
        let text = text.trim_end();
        if text.is_empty() {
            self.out.line("Nothing sent")?;
            return Ok(());
        }
        match self.client.send_message(text).await? {
            Ok(()) => self.out.line(format!("Sent: {}", text))?,
            Err(code) => self.rejected("Sending failed", code)?,
        }
        Ok(())
    }

    async fn set_open(&mut self, open: bool) -> CommandResult {
        let Some(room_id) = self.require_room()? else {
            return Ok(());
        };
        match self.client.set_room_open(room_id, open).await? {
            Ok(()) => {
                let state = if open { "open" } else { "closed" };
                self.out
                    .line(format!("Room {} is now {}", room_id, state))?;
            }
            Err(code) => self.rejected("Changing the room failed", code)?,
        }
        Ok(())
    }

    async fn dismiss(&mut self, room_id: i32) -> CommandResult {
        match self.client.dismiss_room(room_id).await? {
            Ok(()) => self.out.line(format!("Dismissed room {}", room_id))?,
            Err(code) => self.rejected(format_args!("Could not dismiss room {}", room_id), code)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeRoomSettingsNtf, RecvInfoNtf, RoomSettings};
    use crate::net::Endpoint;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn offline_app(input: &'static [u8]) -> (App<&'static [u8]>, SharedBuf) {
        let buf = SharedBuf::default();
        let client = Arc::new(ChatClient::new(Endpoint::Tcp("127.0.0.1:1".to_string())));
        (App::new(client, input, Output::new(buf.clone())), buf)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 5).unwrap()
    }

    #[test]
    fn test_prompt_reflects_room() {
        assert_eq!(prompt(LOBBY), "lobby> ");
        assert_eq!(prompt(7), "room 7> ");
    }

    #[test]
    fn test_format_chat_notification() {
        let ntf = Notification::Chat(RecvInfoNtf {
            room_id: 7,
            join_name: "alice".to_string(),
            info: "hi\n".to_string(),
        });
        assert_eq!(
            format_notification(&ntf, &noon()),
            "[12:00:05] [room 7] alice: hi"
        );
    }

    #[test]
    fn test_format_settings_notification() {
        let ntf = Notification::RoomSettingsChanged(ChangeRoomSettingsNtf {
            room_id: 3,
            settings: RoomSettings {
                room_id: 3,
                room_name: None,
                open: Some(false),
            },
        });
        assert_eq!(
            format_notification(&ntf, &noon()),
            "[12:00:05] [room 3] now closed"
        );

        let bare = Notification::RoomSettingsChanged(ChangeRoomSettingsNtf::default());
        assert!(format_notification(&bare, &noon()).ends_with("settings changed"));
    }

    #[test]
    fn test_interject_redraws_prompt() {
        let buf = SharedBuf::default();
        let out = Output::new(buf.clone());
        out.interject("[room 1] bob: yo", "room 1> ").unwrap();
        assert_eq!(buf.text(), "\r[room 1] bob: yo\nroom 1> ");
    }

    #[tokio::test]
    async fn test_room_commands_in_lobby_stay_local() {
        let (mut app, buf) = offline_app(b"");

        assert_eq!(app.update(Action::Send).await.unwrap(), Flow::Continue);
        assert_eq!(app.update(Action::SetOpen(true)).await.unwrap(), Flow::Continue);
        assert_eq!(app.update(Action::Leave).await.unwrap(), Flow::Continue);

        assert_eq!(buf.text().matches("You are not in a room").count(), 3);
    }

    #[tokio::test]
    async fn test_help_and_quit() {
        let (mut app, buf) = offline_app(b"");
        assert_eq!(app.update(Action::Help).await.unwrap(), Flow::Continue);
        assert!(buf.text().contains("mkroom <name> close"));
        assert_eq!(app.update(Action::Quit).await.unwrap(), Flow::Quit);
    }

    #[tokio::test]
    async fn test_offline_start_declined_reconnect_exits() {
        let (mut app, buf) = offline_app(b"maybe\nn\n");
        app.run().await.unwrap();

        let text = buf.text();
        assert!(text.contains("Please answer y or n"));
        assert!(text.trim_end().ends_with(FAREWELL));
    }

    #[tokio::test]
    async fn test_request_while_offline_is_reported() {
        let (mut app, buf) = offline_app(b"");
        assert_eq!(app.update(Action::List).await.unwrap(), Flow::Continue);
        assert!(buf.text().contains("Request could not complete"));
    }
}
