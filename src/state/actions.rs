//! Console commands.
//!
//! Each input line is parsed into an [`Action`] before anything is sent, so
//! malformed commands never reach the network.

use thiserror::Error;

/// A console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `help`
    Help,
    /// `ls`: room directory, plus members when inside a room.
    List,
    /// `mkroom <name> [close]`: create a room, then join it.
    MakeRoom { name: String, open: bool },
    /// `cd <id>`: join a room, or change nickname when already inside it.
    Enter(i32),
    /// `cd` / `cd ..`
    Leave,
    /// `send`: the chat text is read from the next line.
    Send,
    /// `set open` / `set close`
    SetOpen(bool),
    /// `rm <id>`
    Dismiss(i32),
    /// `quit` / `exit`
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown command \"{0}\", type help for the command list")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not a room id: \"{0}\"")]
    InvalidRoomId(String),
}

const USAGE_CD: &str = "cd [room id | ..]";
const USAGE_MKROOM: &str = "mkroom <name> [close]";
const USAGE_SET: &str = "set [open|close]";
const USAGE_RM: &str = "rm <room id>";

/// Parse one input line. Blank lines give `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Action>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let first = words.next();
    let second = words.next();

    let action = match command {
        "help" => Action::Help,
        "ls" => Action::List,
        "send" => Action::Send,
        "quit" | "exit" => Action::Quit,
        "cd" => match first {
            None | Some("..") => Action::Leave,
            Some(id) => Action::Enter(room_id(id, USAGE_CD)?),
        },
        "mkroom" => {
            let name = first.ok_or(ParseError::Usage(USAGE_MKROOM))?;
            let open = match second {
                None | Some("open") => true,
                Some("close") => false,
                Some(_) => return Err(ParseError::Usage(USAGE_MKROOM)),
            };
            Action::MakeRoom {
                name: name.to_string(),
                open,
            }
        }
        "set" => match first {
            Some("open") => Action::SetOpen(true),
            Some("close") => Action::SetOpen(false),
            _ => return Err(ParseError::Usage(USAGE_SET)),
        },
        "rm" => {
            let id = first.ok_or(ParseError::Usage(USAGE_RM))?;
            Action::Dismiss(room_id(id, USAGE_RM)?)
        }
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(action))
}

fn room_id(word: &str, usage: &'static str) -> Result<i32, ParseError> {
    match word.parse::<i32>() {
        Ok(id) if id > 0 => Ok(id),
        Ok(_) => Err(ParseError::InvalidRoomId(word.to_string())),
        Err(_) if word.starts_with('-') => Err(ParseError::InvalidRoomId(word.to_string())),
        Err(_) => Err(ParseError::Usage(usage)),
    }
}
